pub mod controlmyspa;
pub mod porssari;
pub mod status;
