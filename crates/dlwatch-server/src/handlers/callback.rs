// src/handlers/callback.rs
// Parses and serializes the callback data grammar (spec §6): `action:value`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Pause(String),
    Resume(String),
    Remove(String),
    HistoryPage(u64),
    SearchPage(u64),
    StatusPage(u64),
    PageInfo,
    ClearHistoryConfirm,
    ClearHistoryCancel,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data {
            "clear_history_confirm" => return Some(Self::ClearHistoryConfirm),
            "clear_history_cancel" => return Some(Self::ClearHistoryCancel),
            _ => {}
        }

        let (action, value) = data.split_once(':')?;
        match action {
            "pause" => Some(Self::Pause(value.to_string())),
            "resume" => Some(Self::Resume(value.to_string())),
            "remove" => Some(Self::Remove(value.to_string())),
            "history_page" => value.parse().ok().map(Self::HistoryPage),
            "search_page" => value.parse().ok().map(Self::SearchPage),
            "status_page" => value.parse().ok().map(Self::StatusPage),
            "page_info" => Some(Self::PageInfo),
            _ => None,
        }
    }

    pub fn to_data(&self) -> String {
        match self {
            Self::Pause(gid) => format!("pause:{gid}"),
            Self::Resume(gid) => format!("resume:{gid}"),
            Self::Remove(gid) => format!("remove:{gid}"),
            Self::HistoryPage(p) => format!("history_page:{p}"),
            Self::SearchPage(p) => format!("search_page:{p}"),
            Self::StatusPage(p) => format!("status_page:{p}"),
            Self::PageInfo => "page_info:".to_string(),
            Self::ClearHistoryConfirm => "clear_history_confirm".to_string(),
            Self::ClearHistoryCancel => "clear_history_cancel".to_string(),
        }
    }
}
