    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn summarize(seq: u64, client_id: &str, csn: u64, reference: u64) -> SequencedDocumentMessage {
        SequencedDocumentMessage::new(MessageType::Summarize, seq)
            .with_client(client_id, csn)
            .with_reference(reference)
            .with_contents(json!({"handle": format!("tree-{}", seq), "message": "summary"}))
    }

    fn ack(seq: u64, summary_seq: u64) -> SequencedDocumentMessage {
        SequencedDocumentMessage::new(MessageType::SummaryAck, seq).with_contents(json!({
            "handle": format!("ack-{}", summary_seq),
            "summaryProposal": {"summarySequenceNumber": summary_seq}
        }))
    }

    fn nack(seq: u64, summary_seq: u64) -> SequencedDocumentMessage {
        SequencedDocumentMessage::new(MessageType::SummaryNack, seq).with_contents(json!({
            "errorMessage": "stale",
            "summaryProposal": {"summarySequenceNumber": summary_seq}
        }))
    }

    #[tokio::test]
    async fn test_watched_summary_broadcast_then_ack() {
        let collection = SummaryCollection::new(0);
        let watcher = collection.create_watcher("s1");
        let tracker = watcher.watch_summary(4);
        assert_eq!(tracker.client_sequence_number(), 4);

        collection.handle_op(&summarize(11, "s1", 4, 10));
        let op = tracker.wait_broadcast().await.expect("broadcast");
        assert_eq!(op.sequence_number, 11);
        assert_eq!(op.reference_sequence_number, 10);
        assert_eq!(collection.pending_count(), 1);

        collection.handle_op(&ack(12, 11));
        let verdict = tracker.wait_ack_nack().await.expect("ack");
        assert!(verdict.is_ack());
        assert_eq!(collection.pending_count(), 0);

        let latest = collection.latest_ack().expect("latest ack");
        assert_eq!(latest.summary_op.contents.handle, "tree-11");
        assert_eq!(latest.summary_ack.contents.handle, "ack-11");
    }

    #[tokio::test]
    async fn test_watch_after_broadcast_sees_existing_record() {
        let collection = SummaryCollection::new(0);
        let watcher = collection.create_watcher("s1");
        collection.handle_op(&summarize(5, "s1", 1, 4));

        let tracker = watcher.watch_summary(1);
        assert_eq!(tracker.wait_broadcast().await.map(|op| op.sequence_number), Some(5));
    }

    #[tokio::test]
    async fn test_nack_does_not_move_latest_ack() {
        let collection = SummaryCollection::new(0);
        let watcher = collection.create_watcher("s1");
        let tracker = watcher.watch_summary(1);
        collection.handle_op(&summarize(5, "s1", 1, 4));
        collection.handle_op(&nack(6, 5));

        let verdict = tracker.wait_ack_nack().await.expect("nack");
        assert!(!verdict.is_ack());
        assert_eq!(verdict.summary_sequence_number(), 5);
        assert!(collection.latest_ack().is_none());
    }

    #[test]
    fn test_unknown_ack_is_ignored() {
        let collection = SummaryCollection::new(0);
        collection.handle_op(&ack(3, 2));
        assert!(collection.latest_ack().is_none());
        assert_eq!(collection.pending_count(), 0);
    }

    #[test]
    fn test_other_clients_summaries_are_tracked() {
        let collection = SummaryCollection::new(0);
        collection.handle_op(&summarize(8, "other", 2, 7));
        assert_eq!(collection.pending_count(), 1);
        collection.handle_op(&ack(9, 8));
        assert_eq!(collection.pending_count(), 0);
        assert_eq!(
            collection.latest_ack().map(|a| a.summary_op.client_id),
            Some(Some("other".to_string()))
        );
    }

    #[test]
    fn test_malformed_summarize_is_ignored() {
        let collection = SummaryCollection::new(0);
        let op = SequencedDocumentMessage::new(MessageType::Summarize, 3)
            .with_client("s1", 1)
            .with_contents(json!({"no_handle": true}));
        collection.handle_op(&op);
        assert_eq!(collection.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_flushed_waits_for_pending() {
        let collection = SummaryCollection::new(0);
        collection.handle_op(&summarize(5, "other", 1, 4));

        let waiting = collection.clone();
        let flushed = tokio::spawn(async move { waiting.wait_flushed().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!flushed.is_finished());

        collection.handle_op(&ack(6, 5));
        let acked = flushed.await.expect("join").expect("ack");
        assert_eq!(acked.summary_op.sequence_number, 5);
    }

    #[tokio::test]
    async fn test_wait_flushed_with_nothing_pending() {
        let collection = SummaryCollection::new(7);
        assert_eq!(collection.initial_sequence_number(), 7);
        assert!(collection.wait_flushed().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_summary_ack_by_reference() {
        let collection = SummaryCollection::new(0);
        let waiting = collection.clone();
        let acked = tokio::spawn(async move { waiting.wait_summary_ack(10).await });

        collection.handle_op(&summarize(5, "s1", 1, 4));
        collection.handle_op(&ack(6, 5));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!acked.is_finished());

        collection.handle_op(&summarize(15, "s1", 2, 14));
        collection.handle_op(&ack(16, 15));
        let acked = acked.await.expect("join").expect("ack");
        assert_eq!(acked.summary_op.reference_sequence_number, 14);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_abandons_waits() {
        let collection = SummaryCollection::new(0);
        let watcher = collection.create_watcher("s1");
        let tracker = watcher.watch_summary(1);

        let waiting = tracker.clone();
        let broadcast = tokio::spawn(async move { waiting.wait_broadcast().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        watcher.dispose();
        watcher.dispose();
        assert!(broadcast.await.expect("join").is_none());
        assert!(watcher.wait_flushed().await.is_none());
    }

    #[tokio::test]
    async fn test_resolved_records_are_pruned_on_next_watch() {
        let collection = SummaryCollection::new(0);
        let watcher = collection.create_watcher("s1");
        collection.handle_op(&summarize(5, "s1", 1, 4));
        collection.handle_op(&ack(6, 5));

        let _next = watcher.watch_summary(2);
        let state = collection.inner.state.lock();
        let summaries = state.watchers.get("s1").expect("watcher");
        assert!(!summaries.contains_key(&1));
        assert!(summaries.contains_key(&2));
    }
