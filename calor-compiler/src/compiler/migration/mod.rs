//! Migration Analyzer (A, §4.6): assesses and translates external C#
//! source into Calor source. Independent of the compile pipeline — it
//! consumes C# text, not a Calor [`Program`](crate::compiler::ast::Program).

pub mod constructs;
pub mod convert;
pub mod project;
pub mod scoring;

pub use constructs::UnsupportedConstruct;
pub use convert::{ConversionIssue, ConversionOutcome, FileConversion, IssueSeverity};
pub use project::{
    discover_sources, migrate_project, migrate_project_cancellable, plan_migration,
    CancellationSignal, Convertibility, FileMigrationResult, MigrationError, MigrationReport,
    PlannedFile,
};
pub use scoring::Priority;
