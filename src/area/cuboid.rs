use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::{AreaId, Location, Region};

/// Axis-aligned box between two corners. Bounds are inclusive and the
/// corners may be given in any order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cuboid {
    pub id: AreaId,
    pub first: Location,
    pub second: Location,
}

impl Cuboid {
    pub fn new(id: AreaId, first: Location, second: Location) -> Self {
        Self { id, first, second }
    }
}

fn within(value: f64, a: f64, b: f64) -> bool {
    value >= a.min(b) && value <= a.max(b)
}

impl Region for Cuboid {
    fn id(&self) -> AreaId {
        self.id
    }

    fn world(&self) -> &str {
        &self.first.world
    }

    fn contains(&self, location: &Location, ignore_height: bool) -> bool {
        within(location.x, self.first.x, self.second.x)
            && within(location.y, self.first.y, self.second.y)
            && (ignore_height || within(location.z, self.first.z, self.second.z))
    }
}

impl PartialEq for Cuboid {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Cuboid {}

impl Hash for Cuboid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cuboid() -> Cuboid {
        Cuboid::new(
            AreaId::new(),
            Location::new("world1", 10.0, 0.0, 5.0),
            Location::new("world1", 0.0, 10.0, 0.0),
        )
    }

    #[test]
    fn test_in_region_with_swapped_corners() {
        let cuboid = test_cuboid();
        assert!(cuboid.in_region(&Location::new("world1", 5.0, 5.0, 2.0), false));
        assert!(cuboid.in_region(&Location::new("world1", 10.0, 10.0, 5.0), false));
        assert!(!cuboid.in_region(&Location::new("world1", 10.5, 5.0, 2.0), false));
    }

    #[test]
    fn test_ignore_height() {
        let cuboid = test_cuboid();
        let above = Location::new("world1", 5.0, 5.0, 64.0);
        assert!(!cuboid.in_region(&above, false));
        assert!(cuboid.in_region(&above, true));
    }

    #[test]
    fn test_other_world() {
        let cuboid = test_cuboid();
        assert!(!cuboid.in_region(&Location::new("nether", 5.0, 5.0, 2.0), true));
    }
}
