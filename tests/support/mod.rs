#![allow(dead_code)]

pub mod scratch_home;
pub mod tree;
