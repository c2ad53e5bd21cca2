pub mod pm;
pub mod wcm;
