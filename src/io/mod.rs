pub mod cloud;
pub mod compression;
pub mod glob;
pub mod local;
