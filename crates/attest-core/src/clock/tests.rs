use super::*;

#[test]
fn test_system_clock_monotonic_is_nondecreasing() {
    let clock = SystemClock::new();
    let mut prev = clock.now_mono_ns();
    for _ in 0..1000 {
        let now = clock.now_mono_ns();
        assert!(now >= prev);
        prev = now;
    }
}

#[test]
fn test_manual_clock_advance() {
    let clock = ManualClock::starting_at(100);
    assert_eq!(clock.now_wall_ns(), 100);
    assert_eq!(clock.now_mono_ns(), 100);

    clock.advance(50);
    assert_eq!(clock.now_wall_ns(), 150);
}

#[test]
#[should_panic(expected = "manual clock moved backwards")]
fn test_manual_clock_rejects_regression() {
    let clock = ManualClock::starting_at(100);
    clock.set(99);
}

#[test]
fn test_window_rejects_inverted_bounds() {
    assert!(Window::new(10, 9).is_none());
    assert!(Window::new(10, 10).is_some());
}

#[test]
fn test_window_contains_is_closed_on_both_ends() {
    let w = Window::new(10, 20).unwrap();
    assert!(w.contains(10));
    assert!(w.contains(20));
    assert!(!w.contains(9));
    assert!(!w.contains(21));
}

#[test]
fn test_window_intersects() {
    let w = Window::new(10, 20).unwrap();
    assert!(w.intersects(0, 10));
    assert!(w.intersects(20, 30));
    assert!(w.intersects(12, 15));
    assert!(!w.intersects(0, 9));
    assert!(!w.intersects(21, 30));
}

#[test]
fn test_window_duration() {
    let w = Window::new(5, 25).unwrap();
    assert_eq!(w.duration_ns(), 20);
}
