pub mod reconciler;
pub mod reservation;
pub mod reservation_parser;
