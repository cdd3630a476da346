pub mod reservation;
pub mod room;
pub mod timerange;

pub use reservation::{Reservation, ReservationStatus};
pub use room::Room;
pub use timerange::TimeRange;
