use std::fmt;

use crate::ui::Fragment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A message for the user, the counterpart of a browser alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NoticeLevel::Error
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            NoticeLevel::Info => f.write_str(&self.message),
            NoticeLevel::Error => write!(f, "error: {}", self.message),
        }
    }
}

/// What the host shows: the current notes fragment plus pending notices.
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    fragment: Fragment,
    notices: Vec<Notice>,
}

impl ViewState {
    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn set_fragment(&mut self, fragment: Fragment) {
        self.fragment = fragment;
    }

    pub fn push(&mut self, notice: Notice) {
        if notice.is_error() {
            tracing::warn!(message = %notice.message, "user notice");
        } else {
            tracing::info!(message = %notice.message, "user notice");
        }
        self.notices.push(notice);
    }

    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }
}
