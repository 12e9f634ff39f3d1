    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_timer(delay: Duration) -> (Timer, Arc<AtomicU32>) {
        let count = Arc::new(AtomicU32::new(0));
        let fired = count.clone();
        let timer = Timer::new("test", delay, move || {
            fired.fetch_add(1, Ordering::SeqCst);
        });
        (timer, count)
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_after_delay() {
        let (timer, count) = counting_timer(Duration::from_millis(100));
        timer.start();
        assert!(timer.has_timer());

        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!timer.has_timer());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_clear_prevents_fire() {
        let (timer, count) = counting_timer(Duration::from_millis(100));
        timer.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        timer.clear();
        assert!(!timer.has_timer());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_restart_replaces_pending_fire() {
        let (timer, count) = counting_timer(Duration::from_millis(100));
        timer.start();
        tokio::time::sleep(Duration::from_millis(80)).await;
        timer.start();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_start_with_overrides_default() {
        let (timer, count) = counting_timer(Duration::from_secs(60));
        let other = Arc::new(AtomicU32::new(0));
        let other_fired = other.clone();
        timer.start_with(Duration::from_millis(10), move || {
            other_fired.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(other.load(Ordering::SeqCst), 1);
    }

    fn backoff(timer: Arc<Timer>, fired_at: Arc<Mutex<Vec<Duration>>>, start: tokio::time::Instant, delay: Duration, count: u32) {
        fired_at.lock().push(start.elapsed());
        if count < 3 {
            let next = delay * 2;
            let rearm = timer.clone();
            let log = fired_at.clone();
            timer.start_with(next, move || backoff(rearm.clone(), log.clone(), start, next, count + 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_rearm_from_own_handler() {
        let start = tokio::time::Instant::now();
        let fired_at = Arc::new(Mutex::new(Vec::new()));
        let timer = Arc::new(Timer::new("backoff", Duration::from_millis(10), || {}));

        let rearm = timer.clone();
        let log = fired_at.clone();
        timer.start_with(Duration::from_millis(10), move || {
            backoff(rearm.clone(), log.clone(), start, Duration::from_millis(10), 1)
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        let fired = fired_at.lock().clone();
        let expected = [10u64, 30, 70];
        assert_eq!(fired.len(), expected.len());
        for (at, ms) in fired.iter().zip(expected) {
            assert!(*at >= Duration::from_millis(ms) && *at < Duration::from_millis(ms + 3));
        }
        assert!(!timer.has_timer());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_drop_cancels_pending_fire() {
        let (timer, count) = counting_timer(Duration::from_millis(10));
        timer.start();
        drop(timer);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timer_debug() {
        let (timer, _) = counting_timer(Duration::from_secs(5));
        let debug = format!("{:?}", timer);
        assert!(debug.contains("test"));
        assert!(debug.contains("has_timer: false"));
        assert_eq!(timer.id(), "test");
        assert_eq!(timer.default_duration(), Duration::from_secs(5));
    }
