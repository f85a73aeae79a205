use lyon::math::{point, vector, Point, Vector};

use crate::error::MissingSetupError;
use crate::plot::Plot;
use crate::statement::{Args, Statement};

/// `SC` type selecting point-factor scaling (`xmin,xfactor,ymin,yfactor,2`).
const POINT_FACTOR: i32 = 2;

fn scale_type(numbers: &[f32]) -> i32 {
    numbers.get(4).map_or(0, |t| *t as i32)
}

/// Maps user units to plotter units the way `IP` and `SC` together describe.
///
/// Isotropic scaling (type 1) is treated like anisotropic scaling, which is
/// what it degenerates to when the window has the right aspect ratio anyway.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleMapping {
    p1: Point,
    user_min: Point,
    factor: Vector,
}

impl ScaleMapping {
    pub fn from_setup(input_window: &Statement, scale: &Statement) -> Option<Self> {
        let window = input_window.coords();
        let nums = scale.numbers();
        if window.len() < 2 || nums.len() < 4 {
            return None;
        }
        let (p1, p2) = (window[0], window[1]);

        let (user_min, factor) = if scale_type(nums) == POINT_FACTOR {
            (point(nums[0], nums[2]), vector(nums[1], nums[3]))
        } else {
            let (xspan, yspan) = (nums[1] - nums[0], nums[3] - nums[2]);
            if xspan == 0.0 || yspan == 0.0 {
                return None;
            }
            (point(nums[0], nums[2]), vector((p2.x - p1.x) / xspan, (p2.y - p1.y) / yspan))
        };

        Some(ScaleMapping { p1, user_min, factor })
    }

    pub fn apply(&self, p: Point) -> Point {
        point(
            self.p1.x + (p.x - self.user_min.x) * self.factor.x,
            self.p1.y + (p.y - self.user_min.y) * self.factor.y,
        )
    }
}

/// Flips the plot's Y axis about the vertical span of its geometry by
/// rewriting the effective `SC` statement. No coordinates are touched.
///
/// For a point at user y the plotter ends up where it would have put
/// `bottom + top - y` before; X stays where it was.
pub fn mirror_y(plot: &mut Plot) -> Result<(), MissingSetupError> {
    let input_window = plot.input_window().ok_or(MissingSetupError {
        command: "IP",
        reason: "no input window was set",
    })?;
    let scale = plot.scale().ok_or(MissingSetupError {
        command: "SC",
        reason: "no scaling was set",
    })?;

    let nums = scale.numbers();
    if nums.len() < 4 {
        return Err(MissingSetupError {
            command: "SC",
            reason: "scaling is switched off",
        });
    }

    let bounds = match plot.bounds() {
        Some(bounds) => bounds,
        None => {
            warn!("plot has no geometry, nothing to mirror");
            return Ok(());
        }
    };
    let span = bounds.min.y + bounds.max.y;

    let mut mirrored = nums.to_vec();
    mirrored[2] = span - nums[2];
    mirrored[3] = if scale_type(nums) == POINT_FACTOR { -nums[3] } else { span - nums[3] };

    debug!(
        "mirroring about y = {} inside {}: {} -> {:?}",
        span / 2.0,
        input_window,
        scale,
        mirrored
    );
    let rewritten = scale.with_args(Args::Numbers(mirrored));
    plot.replace_setup(rewritten);
    Ok(())
}
