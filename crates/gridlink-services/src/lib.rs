#![warn(missing_docs)]

//! Typed core service bindings over the Gridlink client facade.
//!
//! A representative slice of the generated binding layer: each method builds
//! a [`gridlink_client::CallDescriptor`] and hands it to the facade, exactly
//! the way generated code does. The crate also exports the `core` service
//! list for static registration.

pub mod model;
pub mod services;

pub use model::{
    Agent, Command, Entity, Measurement, MeasurementType, MeasurementValue, Point, Quality,
    UuidRef,
};
pub use services::{CoreServices, MeasurementFeed, CORE_SERVICE_LIST};
