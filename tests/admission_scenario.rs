use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use turnstile::{
    AdmissionFacade, Algorithm, ConfigureRequest, HealthStatus, ManualClock, RateLimitEngine,
};

fn facade_at(start: f64) -> (Arc<ManualClock>, AdmissionFacade<Arc<ManualClock>>) {
    let clock = Arc::new(ManualClock::new(start));
    let facade = AdmissionFacade::new(
        RateLimitEngine::new(Algorithm::SlidingWindow),
        clock.clone(),
    );
    (clock, facade)
}

fn configure(
    facade: &AdmissionFacade<Arc<ManualClock>>,
    window_seconds: i64,
    requests_per_window: i64,
) {
    facade
        .configure(&ConfigureRequest {
            window_seconds,
            requests_per_window,
        })
        .unwrap();
}

#[test]
fn test_concrete_scenario() {
    let (clock, facade) = facade_at(0.0);
    configure(&facade, 10, 3);

    for (t, expected_remaining) in [(0.0, 2), (1.0, 1), (2.0, 0)] {
        clock.set(t);
        let decision = facade.check("c1", Some("api")).unwrap();
        assert!(decision.allowed, "request at t={} should be allowed", t);
        assert_eq!(decision.remaining, expected_remaining);
        assert_eq!(decision.retry_after, None);
    }

    clock.set(3.0);
    let decision = facade.check("c1", Some("api")).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.remaining, 0);
    assert_eq!(decision.retry_after, Some(7));

    clock.set(11.0);
    assert!(facade.check("c1", Some("api")).unwrap().allowed);
}

#[test]
fn test_window_slides_instead_of_resetting() {
    let (clock, facade) = facade_at(100.0);
    configure(&facade, 10, 2);

    clock.set(100.0);
    assert!(facade.check("c1", None).unwrap().allowed);
    clock.set(105.0);
    assert!(facade.check("c1", None).unwrap().allowed);

    // A fixed window starting at 100 would reset at 110 and admit two more.
    // The sliding window only frees the slot held by t=100.
    clock.set(110.5);
    assert!(facade.check("c1", None).unwrap().allowed);
    assert!(!facade.check("c1", None).unwrap().allowed);
}

#[test]
fn test_rejection_is_repeatable_at_same_instant() {
    let (clock, facade) = facade_at(0.0);
    configure(&facade, 10, 1);

    facade.check("c1", Some("api")).unwrap();
    clock.set(4.0);

    let first = facade.check("c1", Some("api")).unwrap();
    let second = facade.check("c1", Some("api")).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.retry_after, Some(6));
}

#[test]
fn test_parallel_admissions_admit_exactly_the_limit() {
    let (_clock, facade) = facade_at(0.0);
    configure(&facade, 60, 40);
    let facade = Arc::new(facade);

    let admitted = AtomicUsize::new(0);
    let rejected = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            let facade = facade.clone();
            let admitted = &admitted;
            let rejected = &rejected;
            scope.spawn(move || {
                for _ in 0..25 {
                    if facade.check("hot", Some("api")).unwrap().allowed {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    } else {
                        rejected.fetch_add(1, Ordering::SeqCst);
                    }
                }
            });
        }
    });

    assert_eq!(admitted.load(Ordering::SeqCst), 40);
    assert_eq!(rejected.load(Ordering::SeqCst), 160);

    let report = facade.health();
    assert_eq!(report.total_requests, 200);
    assert_eq!(report.total_rejections, 160);
    assert_eq!(report.rejection_rate, 80.0);
    assert_eq!(report.status, HealthStatus::Unhealthy);
}

#[test]
fn test_health_follows_traffic() {
    let (clock, facade) = facade_at(0.0);
    configure(&facade, 10, 4);

    for _ in 0..4 {
        facade.check("c1", Some("api")).unwrap();
    }
    clock.advance(1.0);
    assert_eq!(facade.health().status, HealthStatus::Healthy);

    // 1 rejection out of 5 is exactly 20%
    facade.check("c1", Some("api")).unwrap();
    assert_eq!(facade.health().status, HealthStatus::Degraded);

    // 5 rejections out of 9
    for _ in 0..4 {
        facade.check("c1", Some("api")).unwrap();
    }
    assert_eq!(facade.health().status, HealthStatus::Unhealthy);
}

#[test]
fn test_reconfigure_applies_to_existing_keys() {
    let (_clock, facade) = facade_at(0.0);
    configure(&facade, 10, 5);

    for _ in 0..3 {
        assert!(facade.check("c1", Some("api")).unwrap().allowed);
    }

    configure(&facade, 10, 2);
    let decision = facade.check("c1", Some("api")).unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.retry_after, Some(10));
}
