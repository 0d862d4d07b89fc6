pub mod configuration;
pub mod dialect;
pub mod error;
pub mod version1;

pub use configuration::{make_runtime_configuration, Configuration};
pub use dialect::DialectSettings;
pub use version1::{
    generate_schema, parse_configuration, write_parsed_configuration, ParsedConfiguration,
    CONFIGURATION_FILENAME,
};
