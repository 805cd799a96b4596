pub mod aggregate;
pub mod config;
pub mod dosage;
pub mod genotype;
pub mod interaction;
pub mod main;
pub mod metrics;
pub mod output;
pub mod pipeline;
pub mod plink;
pub mod port;
pub mod reconcile;
#[path = "../shared/files.rs"]
pub mod shared_files;
pub mod tables;
pub mod types;
pub mod shared {
    pub use super::shared_files as files;
}

pub mod score {
    pub use super::{
        aggregate, config, dosage, genotype, interaction, main, metrics, output, pipeline, plink,
        port, reconcile, tables, types,
    };
}
