//! # Firmware programming toolkit for HDZero devices
//!
//! HDZero video transmitters and receivers keep their firmware on a small SPI
//! NOR flash (a W25Q80, 1 MiB). This crate prepares firmware images for that
//! chip and drives the external [`flashrom`](https://flashrom.org) utility to
//! write or read it through a CH341A USB programmer. It also talks to the
//! HDZero release catalog to discover devices and download firmware.
//!
//! The SPI protocol itself is entirely delegated to `flashrom`.
//!
//! # Prerequisites
//!
//! - `flashrom` installed (`brew install flashrom` on macOS)
//! - A CH341A programmer with the clip attached to the flash chip
//!
//! # Examples
//!
//! ## Flashing a local image
//!
//! ```no_run
//! use hdzero_programmer::{
//!     Config, Flashrom, FlashOperation, OperationProgress, PrivilegedRunner,
//! };
//!
//! # async fn flash() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let flashrom = Flashrom::locate(&config.flashrom)?;
//! let runner = PrivilegedRunner::new(config.elevation);
//!
//! let progress = OperationProgress::new(|event| println!("{event:?}"));
//! FlashOperation::new(flashrom, "HDZERO_TX.bin")
//!     .run(&runner, &progress)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Listing firmware releases
//!
//! ```no_run
//! use hdzero_programmer::{CatalogClient, Config};
//!
//! # async fn list() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CatalogClient::new(&Config::default().catalog)?;
//! for device in client.devices().await? {
//!     if let Some(id) = &device.id {
//!         let releases = client.firmwares(id).await?;
//!         println!("{}: {} release(s)", device.display_name(), releases.len());
//!     }
//! }
//! # Ok(())
//! # }
//! ```
#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod flashrom;
pub mod image;
pub mod operation;
pub mod runner;

pub use crate::catalog::{CatalogClient, CatalogError, Device, DeviceId, FirmwareRelease};
pub use crate::config::{CatalogConfig, Config, FlashromConfig};
pub use crate::flashrom::{Flashrom, LocateError};
pub use crate::image::{ImageError, PaddedImage};
pub use crate::operation::{
    BackupOperation, FlashOperation, Operation, OperationError, OperationEvent, OperationProgress,
    Phase,
};
pub use crate::runner::{
    CommandOutput, CommandRunner, Elevation, Invocation, PrivilegedRunner, RunnerError,
};
