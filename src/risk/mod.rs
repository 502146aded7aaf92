pub mod coordinator;
pub mod correlation;
pub mod emergency;

pub use coordinator::{PortfolioCoordinator, PositionSizer};
pub use correlation::{CorrelationRiskManager, ExposureCheck};
pub use emergency::EmergencyRiskManager;
