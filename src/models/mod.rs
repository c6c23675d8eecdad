pub mod appointment;
pub mod business;
pub mod event;
pub mod hours;
pub mod service;
pub mod slot;
pub mod stylist;

pub use appointment::{Appointment, AppointmentStatus, CancelActor, ClientRef};
pub use business::Business;
pub use event::{AppointmentEvent, EventType};
pub use hours::{DayHours, OpenInterval, WeeklyHours};
pub use service::{DepositPolicy, Service};
pub use slot::TimeSlot;
pub use stylist::{DateOverride, Stylist, TimeOff};
