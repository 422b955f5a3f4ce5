//! Atrium Entry - remote entry resolution for micro-apps.
//!
//! An application names its code with a locator; this crate fetches the
//! markup behind it, lifts scripts and stylesheets out into an ordered
//! manifest, embeds the stylesheets back into the wrapper template, and
//! caches the whole resolution per locator so repeated activations never
//! refetch.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod fetch;
pub mod resolver;
pub mod template;

pub use error::{EntryError, EntryResult, FetchError};
pub use fetch::{Fetcher, HttpFetcher};
pub use resolver::{EntryResolver, ResolvedEntry, asset_public_path};
pub use template::{ScriptRef, TemplateAssets, process_markup, public_path, resolve_ref};
