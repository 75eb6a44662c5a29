//! Schema names derived from a stage name.
//!
//! - `{stage}` is the published schema readers see
//! - `{stage}__tmp_{run}` is the working schema of one run
//! - `{stage}__prev` holds the previously published tables after a commit

use ulid::Ulid;

use crate::catalog::{Ident, InvalidNameError};

pub const WORKING_MARKER: &str = "__tmp_";
pub const BACKUP_SUFFIX: &str = "__prev";

/// The three schemas one stage run touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSchemas {
    pub published: Ident,
    pub working: Ident,
    pub backup: Ident,
}

impl StageSchemas {
    /// Fails for stage names that would collide with derived names, or that
    /// are too long to carry the run suffix.
    pub fn for_stage(stage: &Ident, run_id: Ulid) -> Result<Self, InvalidNameError> {
        check_stage_name(stage)?;
        let working = Ident::new(format!(
            "{}{}{}",
            stage,
            WORKING_MARKER,
            run_id.to_string().to_lowercase()
        ))?;
        Ok(Self {
            published: stage.clone(),
            working,
            backup: backup_schema(stage)?,
        })
    }
}

pub fn backup_schema(stage: &Ident) -> Result<Ident, InvalidNameError> {
    Ident::new(format!("{}{}", stage, BACKUP_SUFFIX))
}

pub fn check_stage_name(stage: &Ident) -> Result<(), InvalidNameError> {
    let name = stage.as_str();
    if stage.is_reserved() || is_working_schema(name) || name.ends_with(BACKUP_SUFFIX) {
        return Err(InvalidNameError::Reserved(name.to_string()));
    }
    Ok(())
}

/// Whether `name` carries the working marker. No published schema does.
pub fn is_working_schema(name: &str) -> bool {
    name.to_ascii_lowercase().contains(WORKING_MARKER)
}

/// Split a working schema name into its stage and run id.
pub fn parse_working_schema(name: &str) -> Option<(Ident, Ulid)> {
    let (stage, run) = name.rsplit_once(WORKING_MARKER)?;
    let run_id = Ulid::from_string(&run.to_ascii_uppercase()).ok()?;
    let stage = Ident::new(stage).ok()?;
    Some((stage, run_id))
}
