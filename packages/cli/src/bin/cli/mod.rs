pub mod container;
pub mod run;
