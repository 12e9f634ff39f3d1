    use super::*;
    use std::time::Duration;

    fn configuration() -> SummaryConfiguration {
        SummaryConfiguration {
            idle_time_ms: 100,
            max_time_ms: 10_000,
            max_ops: 10,
            max_ack_wait_time_ms: 500,
        }
    }

    fn heuristics(last_op: u64) -> (SummarizerHeuristics, Arc<Mutex<Vec<SummarizeReason>>>) {
        let reasons = Arc::new(Mutex::new(Vec::new()));
        let recorded = reasons.clone();
        let trigger: TriggerFn = Arc::new(move |reason| recorded.lock().push(reason));
        let first_ack = SummaryAttempt::new(0, Instant::now());
        (
            SummarizerHeuristics::new(configuration(), trigger, last_op, first_ack),
            reasons,
        )
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(SummarizeReason::MaxOps.to_string(), "maxOps");
        assert_eq!(SummarizeReason::MaxTime.to_string(), "maxTime");
        assert_eq!(SummarizeReason::Idle.to_string(), "idle");
        assert_eq!(SummarizeReason::Immediate.to_string(), "immediate");
        let requested = SummarizeReason::Requested {
            client_id: "alice".to_string(),
            contents: "\"checkpoint\"".to_string(),
        };
        assert_eq!(requested.to_string(), ";alice: \"checkpoint\"");
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_ops_triggers_immediately() {
        let (heuristics, reasons) = heuristics(0);
        heuristics.set_last_op_seq_number(10);
        heuristics.run();
        assert!(reasons.lock().is_empty());

        heuristics.set_last_op_seq_number(11);
        heuristics.run();
        assert_eq!(*reasons.lock(), vec![SummarizeReason::MaxOps]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_max_time_takes_precedence_over_max_ops() {
        let (heuristics, reasons) = heuristics(0);
        tokio::time::advance(Duration::from_millis(10_001)).await;
        heuristics.set_last_op_seq_number(50);
        heuristics.run();
        assert_eq!(*reasons.lock(), vec![SummarizeReason::MaxTime]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_trigger_after_quiet_period() {
        let (heuristics, reasons) = heuristics(0);
        heuristics.set_last_op_seq_number(1);
        heuristics.run();

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert!(reasons.lock().is_empty());
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(*reasons.lock(), vec![SummarizeReason::Idle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_debounces_idle_timer() {
        let (heuristics, reasons) = heuristics(0);
        for seq in 1..=5 {
            heuristics.set_last_op_seq_number(seq);
            heuristics.run();
            tokio::time::sleep(Duration::from_millis(60)).await;
        }
        assert!(reasons.lock().is_empty());

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(*reasons.lock(), vec![SummarizeReason::Idle]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_cancels_armed_idle_timer() {
        let (heuristics, reasons) = heuristics(0);
        heuristics.set_last_op_seq_number(5);
        heuristics.run();
        heuristics.set_last_op_seq_number(20);
        heuristics.run();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(*reasons.lock(), vec![SummarizeReason::MaxOps]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_last_sent_moves_baseline() {
        let (heuristics, reasons) = heuristics(0);
        heuristics.set_last_op_seq_number(15);
        heuristics.record_sent(SummaryAttempt::new(15, Instant::now()));
        heuristics.set_last_sent_sequence_number(16);
        assert_eq!(heuristics.last_acked().reference_sequence_number, 0);

        heuristics.ack_last_sent();
        let state = heuristics.snapshot();
        assert_eq!(state.last_acked.reference_sequence_number, 15);
        assert_eq!(state.last_acked.summary_sequence_number, Some(16));
        assert_eq!(state.last_sent, state.last_acked);

        heuristics.run();
        assert!(reasons.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_triggers() {
        let (heuristics, reasons) = heuristics(0);
        heuristics.set_last_op_seq_number(1);
        heuristics.run();
        heuristics.dispose();

        tokio::time::sleep(Duration::from_millis(500)).await;
        heuristics.set_last_op_seq_number(100);
        heuristics.run();
        assert!(reasons.lock().is_empty());
    }
