//! Synthetic scenes the driver can replay.

use nalgebra::Vector3;

use crate::scene::{BoxSpec, SceneConfig};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// One box standing still in front of a static sensor
    StaticBox,

    /// A box driving across the field of view
    Crossing,

    /// Two boxes moving side by side at the same speed
    Convoy,

    /// A crossing box while pose samples go missing for a while
    SensorDropout,

    /// A static box seen from a sensor that drives towards it
    EgoMotion,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::StaticBox,
            ScenarioId::Crossing,
            ScenarioId::Convoy,
            ScenarioId::SensorDropout,
            ScenarioId::EgoMotion,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::StaticBox => "static_box",
            ScenarioId::Crossing => "crossing",
            ScenarioId::Convoy => "convoy",
            ScenarioId::SensorDropout => "sensor_dropout",
            ScenarioId::EgoMotion => "ego_motion",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::StaticBox => "Single static box, static sensor",
            ScenarioId::Crossing => "Box crossing the view at 1 m/s",
            ScenarioId::Convoy => "Two parallel boxes moving together",
            ScenarioId::SensorDropout => "Crossing box with a 0.5 s pose dropout",
            ScenarioId::EgoMotion => "Static box, sensor driving forward at 0.5 m/s",
        }
    }

    /// Builds the scene configuration for this scenario.
    ///
    /// Boxes are placed in the map frame; the sensor starts at the map origin
    /// looking down +z.
    pub fn scene(&self, seed: u64, frames: usize) -> SceneConfig {
        let base = SceneConfig {
            seed,
            frames,
            ..Default::default()
        };

        match self {
            ScenarioId::StaticBox => SceneConfig {
                boxes: vec![BoxSpec::cube(Vector3::new(0.0, -1.0, 4.0), 0.4, Vector3::zeros())],
                ..base
            },
            ScenarioId::Crossing => SceneConfig {
                boxes: vec![BoxSpec::cube(
                    Vector3::new(-2.5, -1.0, 5.0),
                    0.4,
                    Vector3::new(1.0, 0.0, 0.0),
                )],
                ..base
            },
            ScenarioId::Convoy => SceneConfig {
                boxes: vec![
                    BoxSpec::cube(Vector3::new(-2.5, -1.0, 3.5), 0.4, Vector3::new(0.8, 0.0, 0.0)),
                    BoxSpec::cube(Vector3::new(-2.5, -1.0, 6.5), 0.4, Vector3::new(0.8, 0.0, 0.0)),
                ],
                ..base
            },
            ScenarioId::SensorDropout => SceneConfig {
                boxes: vec![BoxSpec::cube(
                    Vector3::new(-2.5, -1.0, 5.0),
                    0.4,
                    Vector3::new(1.0, 0.0, 0.0),
                )],
                pose_dropout: Some((1.0, 1.5)),
                ..base
            },
            ScenarioId::EgoMotion => SceneConfig {
                boxes: vec![BoxSpec::cube(Vector3::new(0.5, -1.0, 7.0), 0.4, Vector3::zeros())],
                ego_velocity: Vector3::new(0.0, 0.0, 0.5),
                ..base
            },
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static_box" | "staticbox" | "static" => Ok(ScenarioId::StaticBox),
            "crossing" => Ok(ScenarioId::Crossing),
            "convoy" => Ok(ScenarioId::Convoy),
            "sensor_dropout" | "sensordropout" | "dropout" => Ok(ScenarioId::SensorDropout),
            "ego_motion" | "egomotion" | "ego" => Ok(ScenarioId::EgoMotion),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
