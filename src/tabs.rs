/// The browser tab boundary
///
/// The core never talks to the browser directly. It reads tab snapshots
/// and asks for closes, opens and focus changes through [`TabHost`].
use crate::error::StashError;
use crate::tab_data::TabSummary;

/// Which tabs to enumerate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabScope {
    CurrentWindow,
    AllWindows,
}

pub trait TabHost {
    fn list_tabs(&self, scope: TabScope) -> Result<Vec<TabSummary>, StashError>;

    fn active_tab_id(&self) -> Option<i32>;

    /// Returns how many tabs were closed
    fn close_tabs(&mut self, ids: &[i32]) -> Result<usize, StashError>;

    fn create_tab(&mut self, url: &str) -> Result<(), StashError>;

    fn focus_tab(&mut self, tab: &TabSummary) -> Result<(), StashError>;
}

/// A browser action requested by the core
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabCommand {
    Close(Vec<i32>),
    Create(String),
    Focus { tab_id: i32, window_id: Option<i32> },
}

/// Host over a pre-fetched tab snapshot that queues every requested action.
/// The caller replays [`RecordingTabHost::take_commands`] against the real
/// browser once the request has finished.
#[derive(Debug, Clone, Default)]
pub struct RecordingTabHost {
    tabs: Vec<TabSummary>,
    current_window: Option<i32>,
    active_tab: Option<i32>,
    commands: Vec<TabCommand>,
}

impl RecordingTabHost {
    pub fn new(tabs: Vec<TabSummary>, current_window: Option<i32>, active_tab: Option<i32>) -> Self {
        RecordingTabHost {
            tabs,
            current_window,
            active_tab,
            commands: Vec::new(),
        }
    }

    pub fn commands(&self) -> &[TabCommand] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<TabCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl TabHost for RecordingTabHost {
    fn list_tabs(&self, scope: TabScope) -> Result<Vec<TabSummary>, StashError> {
        let tabs = match (scope, self.current_window) {
            (TabScope::CurrentWindow, Some(window)) => self
                .tabs
                .iter()
                .filter(|tab| tab.window_id == Some(window))
                .cloned()
                .collect(),
            _ => self.tabs.clone(),
        };
        Ok(tabs)
    }

    fn active_tab_id(&self) -> Option<i32> {
        self.active_tab
    }

    fn close_tabs(&mut self, ids: &[i32]) -> Result<usize, StashError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.tabs.retain(|tab| !ids.contains(&tab.id));
        self.commands.push(TabCommand::Close(ids.to_vec()));
        Ok(ids.len())
    }

    fn create_tab(&mut self, url: &str) -> Result<(), StashError> {
        self.commands.push(TabCommand::Create(url.to_string()));
        Ok(())
    }

    fn focus_tab(&mut self, tab: &TabSummary) -> Result<(), StashError> {
        self.commands.push(TabCommand::Focus {
            tab_id: tab.id,
            window_id: tab.window_id,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tab(id: i32, window_id: i32) -> TabSummary {
        TabSummary {
            window_id: Some(window_id),
            ..TabSummary::new(id, format!("https://{id}.com"), None)
        }
    }

    #[test]
    fn test_list_tabs_by_scope() {
        let host = RecordingTabHost::new(vec![tab(1, 10), tab(2, 20), tab(3, 10)], Some(10), None);

        let current: Vec<i32> = host
            .list_tabs(TabScope::CurrentWindow)
            .unwrap()
            .iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(current, vec![1, 3]);
        assert_eq!(host.list_tabs(TabScope::AllWindows).unwrap().len(), 3);
    }

    #[test]
    fn test_close_records_command() {
        let mut host = RecordingTabHost::new(vec![tab(1, 10), tab(2, 10)], Some(10), None);

        assert_eq!(host.close_tabs(&[1]).unwrap(), 1);
        assert_eq!(host.close_tabs(&[]).unwrap(), 0);

        assert_eq!(host.commands(), &[TabCommand::Close(vec![1])]);
        assert_eq!(host.list_tabs(TabScope::AllWindows).unwrap().len(), 1);
    }

    #[test]
    fn test_take_commands_drains() {
        let mut host = RecordingTabHost::default();
        host.create_tab("https://a.com").unwrap();
        host.focus_tab(&tab(5, 2)).unwrap();

        let commands = host.take_commands();

        assert_eq!(
            commands,
            vec![
                TabCommand::Create("https://a.com".to_string()),
                TabCommand::Focus { tab_id: 5, window_id: Some(2) },
            ]
        );
        assert!(host.commands().is_empty());
    }
}
