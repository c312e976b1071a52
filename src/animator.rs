use std::time::Duration;

/// Period of the animation clock (~60 Hz).
pub const TICK_PERIOD: Duration = Duration::from_millis(16);

/// Easing factor used while animation is enabled.
pub const EASED_RATE: f64 = 0.1;

/// Easing factor used while animation is disabled: one tick reaches the target.
pub const INSTANT_RATE: f64 = 1.0;

/// A point on a control surface, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Displayed (current) and destination (target) state of one group.
///
/// Values are indexed like the group's keys: `[x_axis, y_axis]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedState {
    pub keys: [String; 2],
    pub current_position: Point,
    pub target_position: Point,
    pub current_values: [f64; 2],
    pub target_values: [f64; 2],
}

impl AnimatedState {
    /// State at rest at `position`/`values`.
    pub fn new(keys: [String; 2], position: Point, values: [f64; 2]) -> Self {
        AnimatedState {
            keys,
            current_position: position,
            target_position: position,
            current_values: values,
            target_values: values,
        }
    }

    /// Redirect convergence. The current state is kept as the new starting point.
    pub fn set_target(&mut self, position: Point, values: [f64; 2]) {
        self.target_position = position;
        self.target_values = values;
    }

    fn step(&mut self, rate: f64) {
        self.current_position = Point {
            x: ease(self.current_position.x, self.target_position.x, rate),
            y: ease(self.current_position.y, self.target_position.y, rate),
        };
        for (current, target) in self.current_values.iter_mut().zip(self.target_values) {
            *current = ease(*current, target, rate);
        }
    }

    /// Within `px` of the target position, and each value within its own
    /// entry of `value_tolerance`.
    pub fn is_settled(&self, px: f64, value_tolerance: [f64; 2]) -> bool {
        self.current_position.distance(self.target_position) <= px
            && (0..2).all(|i| {
                (self.current_values[i] - self.target_values[i]).abs() <= value_tolerance[i]
            })
    }
}

#[cfg(test)]
impl AnimatedState {
    fn index_of(&self, key: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == key)
    }

    pub fn current_value(&self, key: &str) -> Option<f64> {
        self.index_of(key).map(|i| self.current_values[i])
    }

    pub fn target_value(&self, key: &str) -> Option<f64> {
        self.index_of(key).map(|i| self.target_values[i])
    }
}

/// Exponential smoothing step. A convex combination, so it never overshoots.
fn ease(current: f64, target: f64, rate: f64) -> f64 {
    if rate >= 1.0 {
        target
    } else {
        current + (target - current) * rate
    }
}

/// Drives every group's [`AnimatedState`] toward its target on each tick.
///
/// Groups are independent; a tick advances all of them by the same rate.
#[derive(Debug, Clone)]
pub struct Animator {
    states: Vec<(String, AnimatedState)>,
    eased_rate: f64,
    enabled: bool,
}

impl Default for Animator {
    fn default() -> Self {
        Animator::new(EASED_RATE)
    }
}

impl Animator {
    /// `eased_rate` must lie in `(0, 1]`; anything else falls back to [`EASED_RATE`].
    pub fn new(eased_rate: f64) -> Self {
        let eased_rate = if eased_rate > 0.0 && eased_rate <= 1.0 {
            eased_rate
        } else {
            log::warn!("Easing rate {eased_rate} outside (0, 1], using {EASED_RATE}");
            EASED_RATE
        };
        Animator {
            states: Vec::new(),
            eased_rate,
            enabled: true,
        }
    }

    /// Add or replace the state for `tag`.
    pub fn insert(&mut self, tag: &str, state: AnimatedState) {
        match self.get_mut(tag) {
            Some(existing) => *existing = state,
            None => self.states.push((tag.to_string(), state)),
        }
    }

    pub fn get(&self, tag: &str) -> Option<&AnimatedState> {
        self.states.iter().find(|(t, _)| t == tag).map(|(_, s)| s)
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut AnimatedState> {
        self.states
            .iter_mut()
            .find(|(t, _)| t == tag)
            .map(|(_, s)| s)
    }

    pub fn states(&self) -> impl Iterator<Item = (&str, &AnimatedState)> {
        self.states.iter().map(|(t, s)| (t.as_str(), s))
    }

    /// Returns `false` if `tag` is not animated.
    pub fn set_target(&mut self, tag: &str, position: Point, values: [f64; 2]) -> bool {
        match self.get_mut(tag) {
            Some(state) => {
                state.set_target(position, values);
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Rate applied by the next tick.
    pub fn rate(&self) -> f64 {
        if self.enabled {
            self.eased_rate
        } else {
            INSTANT_RATE
        }
    }

    pub fn tick(&mut self) {
        let rate = self.rate();
        for (_, state) in &mut self.states {
            state.step(rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> [String; 2] {
        ["tone".to_string(), "energy".to_string()]
    }

    fn animator_with(tag: &str, position: Point, values: [f64; 2], rate: f64) -> Animator {
        let mut a = Animator::new(rate);
        a.insert(tag, AnimatedState::new(keys(), position, values));
        a
    }

    #[test]
    fn distance_shrinks_geometrically() {
        let rate = 0.1;
        let mut a = animator_with("g", Point::new(0.0, 0.0), [0.0, 10.0], rate);
        a.set_target("g", Point::new(100.0, -50.0), [10.0, 0.0]);

        let start = a.get("g").unwrap().clone();
        let d0 = start.current_position.distance(start.target_position);
        for k in 1..=20 {
            a.tick();
            let s = a.get("g").unwrap();
            let expected = d0 * (1.0 - rate).powi(k);
            let dk = s.current_position.distance(s.target_position);
            assert!((dk - expected).abs() < 1e-9, "tick {k}: {dk} vs {expected}");

            let expected_value = 10.0 * (1.0 - rate).powi(k);
            assert!(((10.0 - s.current_values[0]) - expected_value).abs() < 1e-9);
            assert!((s.current_values[1] - expected_value).abs() < 1e-9);
        }
    }

    #[test]
    fn never_overshoots() {
        let mut a = animator_with("g", Point::new(0.0, 0.0), [0.0, 0.0], 0.35);
        a.set_target("g", Point::new(10.0, 10.0), [1.0, 1.0]);
        let mut last = f64::INFINITY;
        for _ in 0..200 {
            a.tick();
            let s = a.get("g").unwrap();
            assert!(s.current_position.x <= 10.0);
            assert!(s.current_values[0] <= 1.0);
            let d = s.current_position.distance(s.target_position);
            assert!(d <= last);
            last = d;
        }
        assert!(a.get("g").unwrap().is_settled(1e-6, [1e-6; 2]));
    }

    #[test]
    fn settling_uses_per_axis_tolerance() {
        let mut s = AnimatedState::new(keys(), Point::new(10.0, 10.0), [0.0004, 5.0]);
        s.set_target(Point::new(10.0, 10.0), [0.0, 5.0]);
        // A thousandth of a 0.001-wide range is still far off.
        assert!(!s.is_settled(0.5, [1e-6, 1e-2]));
        assert!(s.is_settled(0.5, [1e-3, 1e-2]));

        s.set_target(Point::new(11.0, 10.0), [0.0004, 5.0]);
        assert!(!s.is_settled(0.5, [1.0, 1.0]));
    }

    #[test]
    fn disabled_animation_snaps_in_one_tick() {
        let mut a = animator_with("g", Point::new(0.3, 0.7), [0.1, 0.2], 0.1);
        a.set_enabled(false);
        assert_eq!(a.rate(), INSTANT_RATE);
        a.set_target("g", Point::new(123.456, 78.9), [3.3, 7.7]);
        a.tick();

        let s = a.get("g").unwrap();
        assert_eq!(s.current_position, s.target_position);
        assert_eq!(s.current_values, [3.3, 7.7]);
    }

    #[test]
    fn redirect_starts_from_current_position() {
        let mut a = animator_with("g", Point::new(0.0, 0.0), [0.0, 0.0], 0.5);
        a.set_target("g", Point::new(100.0, 0.0), [10.0, 0.0]);
        a.tick();
        a.tick();
        let mid = a.get("g").unwrap().current_position;
        assert_eq!(mid, Point::new(75.0, 0.0));

        a.set_target("g", Point::new(0.0, 0.0), [0.0, 0.0]);
        assert_eq!(a.get("g").unwrap().current_position, mid);
        a.tick();
        assert_eq!(a.get("g").unwrap().current_position, Point::new(37.5, 0.0));
        assert_eq!(a.get("g").unwrap().current_values[0], 3.75);
    }

    #[test]
    fn groups_animate_independently() {
        let mut a = Animator::new(0.5);
        a.insert(
            "a",
            AnimatedState::new(keys(), Point::new(0.0, 0.0), [0.0, 0.0]),
        );
        a.insert(
            "b",
            AnimatedState::new(keys(), Point::new(50.0, 50.0), [5.0, 5.0]),
        );
        a.set_target("a", Point::new(10.0, 0.0), [1.0, 0.0]);
        a.tick();

        assert_eq!(a.get("a").unwrap().current_position, Point::new(5.0, 0.0));
        let b = a.get("b").unwrap();
        assert_eq!(b.current_position, Point::new(50.0, 50.0));
        assert_eq!(b.current_values, [5.0, 5.0]);
        assert!(!a.set_target("missing", Point::default(), [0.0, 0.0]));
    }

    #[test]
    fn out_of_range_rate_falls_back() {
        assert_eq!(Animator::new(0.0).rate(), EASED_RATE);
        assert_eq!(Animator::new(1.5).rate(), EASED_RATE);
        assert_eq!(Animator::new(0.25).rate(), 0.25);
    }

    #[test]
    fn lookup_by_key() {
        let s = AnimatedState::new(keys(), Point::default(), [1.0, 2.0]);
        assert_eq!(s.current_value("energy"), Some(2.0));
        assert_eq!(s.target_value("tone"), Some(1.0));
        assert_eq!(s.current_value("speed"), None);
    }
}
