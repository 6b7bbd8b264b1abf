pub mod adjustment_service;
pub mod back_calculation;
pub mod barcode;
pub mod lot_distribution;

pub use adjustment_service::AdjustmentService;
