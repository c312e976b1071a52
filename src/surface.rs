use serde::Deserialize;

use crate::animator::{AnimatedState, Animator, Point};
use crate::params::{ParameterGroup, ParameterSet};

/// Square interaction region of side `size` with a dead `margin` on every edge.
///
/// The valid area is `margin..=size - margin` on both axes. Screen Y grows
/// downwards while values grow upwards, so the Y axis is inverted.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct SurfaceGeometry {
    pub size: f64,
    pub margin: f64,
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        SurfaceGeometry {
            size: 500.0,
            margin: 50.0,
        }
    }
}

impl SurfaceGeometry {
    /// `None` unless the valid area has positive width.
    pub fn new(size: f64, margin: f64) -> Option<Self> {
        let g = SurfaceGeometry { size, margin };
        (margin >= 0.0 && g.span() > 0.0).then_some(g)
    }

    /// Width of the valid area.
    pub fn span(&self) -> f64 {
        self.size - 2.0 * self.margin
    }

    pub fn contains(&self, p: Point) -> bool {
        let lo = self.margin;
        let hi = self.size - self.margin;
        (lo..=hi).contains(&p.x) && (lo..=hi).contains(&p.y)
    }

    /// Normalized `(x, y)` for a click, or `None` outside the valid area.
    pub fn percentages(&self, p: Point) -> Option<(f64, f64)> {
        if !self.contains(p) {
            return None;
        }
        let x = (p.x - self.margin) / self.span();
        let y = 1.0 - (p.y - self.margin) / self.span();
        Some((x, y))
    }

    /// Inverse of [`percentages`](Self::percentages).
    pub fn position_for(&self, x_percent: f64, y_percent: f64) -> Point {
        Point {
            x: self.margin + x_percent * self.span(),
            y: (self.size - self.margin) - y_percent * self.span(),
        }
    }
}

/// Result of a click accepted by [`apply_click`].
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceClick {
    pub position: Point,
    pub x_percent: f64,
    pub y_percent: f64,
    /// Decoded values, `[x_axis, y_axis]`.
    pub values: [f64; 2],
}

/// Resting animation state for `group`, placed from the parameters' current values.
pub fn initial_state(
    geometry: &SurfaceGeometry,
    group: &ParameterGroup,
    params: &ParameterSet,
) -> Option<AnimatedState> {
    let x = params.get(&group.x)?;
    let y = params.get(&group.y)?;
    let position = geometry.position_for(x.normalize(x.value()), y.normalize(y.value()));
    Some(AnimatedState::new(
        [group.x.clone(), group.y.clone()],
        position,
        [x.value(), y.value()],
    ))
}

/// Map a click on `group`'s surface to parameter values.
///
/// Commits the values into `params` and retargets the group in `animator`.
/// Clicks outside the valid area change nothing and return `None`.
pub fn apply_click(
    geometry: &SurfaceGeometry,
    group: &ParameterGroup,
    params: &mut ParameterSet,
    animator: &mut Animator,
    point: Point,
) -> Option<SurfaceClick> {
    let (x_percent, y_percent) = geometry.percentages(point)?;
    let x_value = params.get(&group.x)?.denormalize(x_percent);
    let y_value = params.get(&group.y)?.denormalize(y_percent);

    params.set_value(&group.x, x_value);
    params.set_value(&group.y, y_value);

    let values = [x_value, y_value];
    if !animator.set_target(&group.tag, point, values) {
        log::debug!("Surface click on '{}' with no animation state", group.tag);
    }

    Some(SurfaceClick {
        position: point,
        x_percent,
        y_percent,
        values,
    })
}
