//! Property tests for the capture formatter: every field present on an
//! event appears in the rendered document, verbatim or in its documented
//! truncated form.

use std::collections::HashMap;

use proptest::prelude::*;
use vigil_core::event::{CaptureEvent, CrashCapture, HangCapture, ThreadDump};
use vigil_core::format::{MAX_FRAMES_PER_THREAD, render};

fn frame_strategy() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,20}(::[a-z_][a-z0-9_]{0,12}){0,3}"
}

proptest! {
    #[test]
    fn crash_fields_round_trip_into_document(
        thread_name in "[a-zA-Z][a-zA-Z0-9_-]{0,16}",
        thread_id in 1u64..10_000,
        message in "[a-zA-Z0-9 .,:!'-]{1,60}",
        frames in prop::collection::vec(frame_strategy(), 0..25),
    ) {
        let event = CaptureEvent::Crash(CrashCapture {
            timestamp_ms: 1_700_000_000_000,
            thread_name: thread_name.clone(),
            thread_id,
            error_type: "panic".to_string(),
            error_message: message.clone(),
            location: None,
            frames: frames.clone(),
            device_info: None,
            app_info: None,
        });
        let text = render(&event);

        let thread_line = format!("Thread: {} (id={})", thread_name, thread_id);
        prop_assert!(text.contains(&thread_line));
        let exception_line = format!("Exception: panic: {}", message);
        prop_assert!(text.contains(&exception_line));
        // The faulting thread's stack is never truncated.
        for frame in &frames {
            let frame_line = format!("  at {}", frame);
            prop_assert!(text.contains(&frame_line));
        }
        let at_lines = text.lines().filter(|l| l.starts_with("  at ")).count();
        prop_assert_eq!(at_lines, frames.len());
    }

    #[test]
    fn per_thread_frames_truncate_at_ten(
        frame_count in 0usize..40,
    ) {
        let frames: Vec<String> = (0..frame_count).map(|i| format!("f_{i}")).collect();
        let mut threads = HashMap::new();
        threads.insert(1, ThreadDump {
            name: "t".to_string(),
            id: 1,
            state: "running".to_string(),
            frames,
        });
        let event = CaptureEvent::Hang(HangCapture {
            timestamp_ms: 1_700_000_000_000,
            primary_frames: vec!["main".to_string()],
            all_threads: Some(threads),
            device_info: None,
            app_info: None,
        });
        let text = render(&event);

        let rendered = text.lines().filter(|l| l.starts_with("  at f_")).count();
        prop_assert_eq!(rendered, frame_count.min(MAX_FRAMES_PER_THREAD));
        if frame_count > MAX_FRAMES_PER_THREAD {
            let marker = format!("  ... {} more", frame_count - MAX_FRAMES_PER_THREAD);
            prop_assert!(text.contains(&marker));
        } else {
            prop_assert!(!text.contains("more"));
        }
    }

    #[test]
    fn every_document_is_framed(
        kind in 0..2i32,
    ) {
        let event = if kind == 0 {
            CaptureEvent::Crash(CrashCapture {
                timestamp_ms: 0,
                thread_name: "main".to_string(),
                thread_id: 1,
                error_type: "panic".to_string(),
                error_message: "x".to_string(),
                location: None,
                frames: vec![],
                device_info: None,
                app_info: None,
            })
        } else {
            CaptureEvent::Hang(HangCapture {
                timestamp_ms: 0,
                primary_frames: vec![],
                all_threads: None,
                device_info: None,
                app_info: None,
            })
        };
        let text = render(&event);
        prop_assert!(text.starts_with("=== "));
        prop_assert!(text.contains("Log Version: 1.0"));
        prop_assert!(text.ends_with("=== END LOG ===\n"));
    }
}
