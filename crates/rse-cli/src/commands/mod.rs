pub mod harvest;
pub mod plan;
pub mod run;

use std::error::Error;

use rse_core::{RseError, Stage};

/// How the user named a stage on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageSelector {
    Index(i64),
    Named(Stage),
}

impl StageSelector {
    pub fn parse(text: &str) -> Result<Self, RseError> {
        match text.trim().parse::<i64>() {
            Ok(index) => Ok(StageSelector::Index(index)),
            Err(_) => text.parse::<Stage>().map(StageSelector::Named),
        }
    }

    pub fn resolve(self) -> Result<Stage, RseError> {
        match self {
            StageSelector::Index(index) => Stage::from_index(index),
            StageSelector::Named(stage) => Ok(stage),
        }
    }
}

pub fn boxed(err: RseError) -> Box<dyn Error> {
    Box::new(err)
}
