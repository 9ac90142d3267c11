// src/models/mod.rs

pub mod sphere;
