/// Shared runtime state
///
/// The only data written by one thread and read by others: device
/// calibration (aim point and zoom), the connectivity flag, and the running
/// flag. Everything is handed out as a copy.

pub mod calibration;
pub mod connectivity;
pub mod shared;

pub use calibration::{CalibrationStore, DeviceSettings};
pub use connectivity::ConnectivityState;
pub use shared::SharedState;
