use rmcore::engine::diagnostics::{Notice, NoticeCallback};
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Collects engine notices worth showing to the user once a command finishes.
#[derive(Clone, Default)]
pub struct CliNoticeHandler {
    messages: Arc<Mutex<Vec<String>>>,
}

impl CliNoticeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_callback(&self) -> NoticeCallback<'static> {
        let messages = self.messages.clone();

        Box::new(move |notice: &Notice| {
            let Some(message) = describe(notice) else {
                return;
            };
            let Ok(mut guard) = messages.lock() else {
                warn!("Notice buffer mutex was poisoned. Dropping notice.");
                return;
            };
            guard.push(message);
        })
    }

    pub fn messages(&self) -> Vec<String> {
        match self.messages.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => Vec::new(),
        }
    }
}

/// User-facing text for notices that point at a problem in the run file.
pub fn describe(notice: &Notice) -> Option<String> {
    match notice {
        Notice::RedundantDefinition {
            restraint,
            definition,
            replaces,
        } => Some(format!(
            "{restraint}: definition {definition} repeats definition {replaces} and replaces its bounds"
        )),
        Notice::UnknownMolecule { restraint, name } => Some(format!(
            "{restraint}: template molecule '{name}' does not occur in the system"
        )),
        Notice::RedundantTemplateEntry {
            restraint,
            molecule,
            entry,
        } => Some(format!(
            "{restraint}: template entry {entry} of '{molecule}' is redundant and was ignored"
        )),
        Notice::DefinitionsDeferred { .. }
        | Notice::DefinitionsRecompiled { .. }
        | Notice::AtomCollected { .. }
        | Notice::AtomRestored { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcore::engine::restraint::{EngineEvent, RestraintKind};

    #[test]
    fn only_run_file_problems_are_kept() {
        let handler = CliNoticeHandler::new();
        let callback = handler.get_callback();
        callback(&Notice::RedundantDefinition {
            restraint: RestraintKind::ImproperAngle,
            definition: 2,
            replaces: 0,
        });
        callback(&Notice::DefinitionsRecompiled {
            restraint: RestraintKind::Coordination,
            event: EngineEvent::EngineSet,
            definitions: 3,
        });

        let messages = handler.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            messages[0],
            "improper-angle: definition 2 repeats definition 0 and replaces its bounds"
        );
    }
}
