// src/models/mod.rs

pub mod category;
pub mod exam;
pub mod progress;
pub mod question;
pub mod user;
