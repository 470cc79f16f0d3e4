pub mod error;
pub mod facility;
pub mod gateway;
pub mod metrics;
pub mod model;

pub use error::SchedulerError;
pub use facility::{AlarmFacility, TokioAlarms};
pub use gateway::{AlarmAction, SchedulerGateway};
pub use model::{Alarm, AlarmKind, FiredAlarm, MeetingKey, SWEEP_ALARM, SWEEP_PERIOD};
