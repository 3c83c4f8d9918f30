use log::trace;
use shared::{Position, AREA_WIDTH, OBJECT_SIZE, OBJECT_START_X, OBJECT_START_Y, OBJECT_STEP};
use thiserror::Error;

/// A world configuration in which the object could not oscillate
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorldError {
    #[error("area width {area_width} is too narrow, at least {min} is needed")]
    AreaTooNarrow { area_width: i32, min: i32 },
    #[error("object step must not be zero")]
    ZeroStep,
}

/// The moving rectangle and the area it bounces in.
///
/// The object oscillates along the x axis: it moves right by `step` until its
/// left edge reaches `area_width - 2 * size`, then moves left until it is at
/// or below `size / 2`, and so on. `y` never changes.
#[derive(Debug, Clone)]
pub struct World {
    tick: u64,
    position: Position,
    size: i32,
    step: i32,
    area_width: i32,
}

impl World {
    /// Creates the default object at its start position inside an area of
    /// the given width.
    pub fn new(area_width: i32) -> Result<Self, WorldError> {
        Self::with_object(
            Position::new(OBJECT_START_X, OBJECT_START_Y),
            OBJECT_SIZE,
            OBJECT_STEP,
            area_width,
        )
    }

    /// Creates a world with a custom object.
    ///
    /// The right bound has to lie beyond the left bound, otherwise the bounce
    /// rule keeps pushing the object left forever.
    pub fn with_object(
        position: Position,
        size: i32,
        step: i32,
        area_width: i32,
    ) -> Result<Self, WorldError> {
        if step == 0 {
            return Err(WorldError::ZeroStep);
        }

        let min = Self::min_area_width(size);
        if area_width < min {
            return Err(WorldError::AreaTooNarrow { area_width, min });
        }

        Ok(Self {
            tick: 0,
            position,
            size,
            step: step.abs(),
            area_width,
        })
    }

    /// Smallest area width in which an object of `size` still bounces.
    pub fn min_area_width(size: i32) -> i32 {
        size * 2 + size / 2 + 1
    }

    /// Number of completed ticks
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Current position of the object's top-left corner
    pub fn position(&self) -> Position {
        self.position
    }

    /// Signed step applied on the next tick unless a bound flips it.
    ///
    /// Positive while moving right, negative while moving left.
    pub fn step(&self) -> i32 {
        self.step
    }

    /// `x` at or beyond which the object turns left
    pub fn right_bound(&self) -> i32 {
        self.area_width - self.size * 2
    }

    /// `x` at or below which the object turns right
    pub fn left_bound(&self) -> i32 {
        self.size / 2
    }

    /// Applies the bounce rule, then moves one step.
    pub fn advance(&mut self) -> Position {
        if self.position.x >= self.right_bound() {
            self.step = -self.step.abs();
        } else if self.position.x <= self.left_bound() {
            self.step = self.step.abs();
        }

        self.position.x += self.step;
        self.tick += 1;
        trace!("Tick {}: object at {}", self.tick, self.position);
        self.position
    }
}

impl Default for World {
    fn default() -> Self {
        Self {
            tick: 0,
            position: Position::new(OBJECT_START_X, OBJECT_START_Y),
            size: OBJECT_SIZE,
            step: OBJECT_STEP,
            area_width: AREA_WIDTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xs(world: &mut World, ticks: usize) -> Vec<i32> {
        (0..ticks).map(|_| world.advance().x).collect()
    }

    #[test]
    fn test_world_creation() {
        let world = World::default();
        assert_eq!(world.position(), Position::new(20, 20));
        assert_eq!(world.step(), 10);
        assert_eq!(world.tick(), 0);
        assert_eq!(world.right_bound(), 740);
        assert_eq!(world.left_bound(), 15);
    }

    #[test]
    fn test_first_tick_moves_right() {
        let mut world = World::default();
        assert_eq!(world.advance(), Position::new(30, 20));
        assert_eq!(world.tick(), 1);
    }

    #[test]
    fn test_bounce_in_narrow_area() {
        // width 100, object 30: right bound 40, left bound 15
        let mut world = World::with_object(Position::new(20, 20), 30, 10, 100).unwrap();
        assert_eq!(xs(&mut world, 8), vec![30, 40, 30, 20, 10, 20, 30, 40]);
    }

    #[test]
    fn test_new_matches_default() {
        let world = World::new(AREA_WIDTH).unwrap();
        let default = World::default();
        assert_eq!(world.position(), default.position());
        assert_eq!(world.right_bound(), default.right_bound());
    }

    #[test]
    fn test_rejects_area_too_narrow_to_bounce() {
        assert_eq!(World::min_area_width(30), 76);
        assert_eq!(
            World::new(40).unwrap_err(),
            WorldError::AreaTooNarrow {
                area_width: 40,
                min: 76
            }
        );
        assert!(World::new(75).is_err());
        assert_eq!(
            World::with_object(Position::new(20, 20), 30, 0, 800).unwrap_err(),
            WorldError::ZeroStep
        );
    }

    #[test]
    fn test_narrowest_area_still_oscillates() {
        // right bound 16, left bound 15
        let mut world = World::new(76).unwrap();
        for _ in 0..1000 {
            let x = world.advance().x;
            assert!((0..=40).contains(&x), "object escaped to {}", x);
        }
    }

    #[test]
    fn test_reverses_at_right_bound() {
        let mut world = World::default();
        let mut previous = world.position().x;
        let mut reversed_at = None;

        for _ in 0..200 {
            let x = world.advance().x;
            if x < previous {
                reversed_at = Some(previous);
                break;
            }
            previous = x;
        }

        let turn = reversed_at.expect("object should reverse");
        assert!(turn >= world.right_bound());
        assert_eq!(world.step(), -10);
    }

    #[test]
    fn test_stays_within_bounds() {
        let mut world = World::default();
        for _ in 0..1000 {
            let pos = world.advance();
            assert!(pos.x >= world.left_bound() - world.step().abs());
            assert!(pos.x <= world.right_bound() + world.step().abs());
            assert_eq!(pos.y, 20);
        }
    }
}
