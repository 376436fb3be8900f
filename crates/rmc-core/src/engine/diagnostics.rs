use super::restraint::{EngineEvent, RestraintKind};
use crate::core::definitions::CompileNote;
use tracing::{debug, info, warn};

/// Non-fatal observations reported by restraints.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// Definitions were stored unresolved because no atomic system is attached yet.
    DefinitionsDeferred {
        restraint: RestraintKind,
        specs: usize,
    },
    /// A definition repeated the atom tuple of an earlier one and replaced its bounds.
    RedundantDefinition {
        restraint: RestraintKind,
        definition: usize,
        replaces: usize,
    },
    /// A template refers to a molecule name that no atom carries.
    UnknownMolecule {
        restraint: RestraintKind,
        name: String,
    },
    /// A template entry repeated an earlier one for the same molecule and was ignored.
    RedundantTemplateEntry {
        restraint: RestraintKind,
        molecule: String,
        entry: usize,
    },
    /// Definitions were recompiled in response to a lifecycle event.
    DefinitionsRecompiled {
        restraint: RestraintKind,
        event: EngineEvent,
        definitions: usize,
    },
    AtomCollected {
        restraint: RestraintKind,
        atom: usize,
    },
    AtomRestored {
        restraint: RestraintKind,
        atom: usize,
    },
}

impl Notice {
    pub fn from_compile_note(restraint: RestraintKind, note: CompileNote) -> Self {
        match note {
            CompileNote::Redundant {
                definition,
                replaces,
            } => Notice::RedundantDefinition {
                restraint,
                definition,
                replaces,
            },
            CompileNote::UnknownMolecule { name } => Notice::UnknownMolecule { restraint, name },
            CompileNote::RedundantTemplateEntry { molecule, entry } => {
                Notice::RedundantTemplateEntry {
                    restraint,
                    molecule,
                    entry,
                }
            }
        }
    }
}

pub type NoticeCallback<'a> = Box<dyn Fn(&Notice) + Send + Sync + 'a>;

/// Sink for [`Notice`]s, passed explicitly to whatever may produce them.
///
/// Every notice is also emitted as a `tracing` event, so a sink without a callback still
/// leaves a trace in the logs.
#[derive(Default)]
pub struct Diagnostics<'a> {
    callback: Option<NoticeCallback<'a>>,
}

impl<'a> Diagnostics<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: NoticeCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    pub fn report(&self, notice: Notice) {
        match &notice {
            Notice::RedundantDefinition {
                restraint,
                definition,
                replaces,
            } => warn!(
                %restraint,
                definition, replaces, "Redundant definition replaces earlier bounds."
            ),
            Notice::UnknownMolecule { restraint, name } => {
                warn!(%restraint, molecule = %name, "Template molecule not found in system.")
            }
            Notice::RedundantTemplateEntry {
                restraint,
                molecule,
                entry,
            } => warn!(%restraint, %molecule, entry, "Redundant template entry ignored."),
            Notice::DefinitionsDeferred { restraint, specs } => {
                info!(%restraint, specs, "Definitions deferred until a system is attached.")
            }
            Notice::DefinitionsRecompiled {
                restraint,
                event,
                definitions,
            } => info!(%restraint, ?event, definitions, "Definitions recompiled."),
            Notice::AtomCollected { restraint, atom } => {
                debug!(%restraint, atom, "Atom collected.")
            }
            Notice::AtomRestored { restraint, atom } => {
                debug!(%restraint, atom, "Atom restored.")
            }
        }
        if let Some(cb) = &self.callback {
            cb(&notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn report_forwards_notices_to_callback() {
        let received = Mutex::new(Vec::new());
        let diagnostics = Diagnostics::with_callback(Box::new(|notice: &Notice| {
            received.lock().unwrap().push(notice.clone());
        }));
        diagnostics.report(Notice::AtomCollected {
            restraint: RestraintKind::Coordination,
            atom: 4,
        });
        drop(diagnostics);
        assert_eq!(
            received.into_inner().unwrap(),
            vec![Notice::AtomCollected {
                restraint: RestraintKind::Coordination,
                atom: 4
            }]
        );
    }

    #[test]
    fn compile_notes_map_to_notices() {
        let notice = Notice::from_compile_note(
            RestraintKind::ImproperAngle,
            CompileNote::Redundant {
                definition: 2,
                replaces: 0,
            },
        );
        assert_eq!(
            notice,
            Notice::RedundantDefinition {
                restraint: RestraintKind::ImproperAngle,
                definition: 2,
                replaces: 0
            }
        );
    }

    #[test]
    fn report_without_callback_is_silent() {
        Diagnostics::new().report(Notice::DefinitionsDeferred {
            restraint: RestraintKind::Coordination,
            specs: 1,
        });
    }
}
