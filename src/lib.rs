//! Core library for the bomflow-etl command line application.
//!
//! The library turns a MasterBOM/Status workbook into analysis-ready fact and
//! dimension tables. Responsibilities are kept narrow: file adapters live
//! under [`bomflow::etl::io`], the row and table types in
//! [`bomflow::etl::model`], the business rules in [`bomflow::etl::masterbom`]
//! and [`bomflow::etl::status`], record flattening in
//! [`bomflow::etl::flatten`], and the run orchestration under
//! [`bomflow::etl::pipeline`].

pub mod bomflow;

pub use bomflow::etl::{
    EtlError, Result, config, dates, error, flatten, io, masterbom, model, normalize, pipeline,
    status, writer,
};
