pub mod capacity_dto;
pub mod config_dto;
