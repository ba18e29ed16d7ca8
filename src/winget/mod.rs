pub mod client;
pub mod locator;
pub mod output_parser;
pub mod package;

pub use client::{PackageManager, PackageManagerFactory, WingetClient, WingetFactory};
pub use output_parser::parse;
pub use package::{UpgradeCandidate, UpgradeOutcome};
