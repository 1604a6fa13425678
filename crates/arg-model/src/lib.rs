//! Time discretization and demographic model of the ARG sampler.

pub mod model;
pub mod popsize;
pub mod time;
pub mod track;

pub use model::ArgModel;
pub use popsize::{PopsizeConfig, PopsizeParam};
pub use time::{get_delta, get_time_point, TimeModel, TimeSpacing, DEFAULT_DELTA};
pub use track::{NullTrack, RegionValue, Track};
