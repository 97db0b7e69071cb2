use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const TITLE: &str = "Anyplace";
const ICON: &str = "./img/icon-192.png";
const TAG: &str = "anyplace-update";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub tag: String,
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    /// The "new timeline data" notification raised by background sync.
    pub fn new_data(entries: usize) -> Self {
        Self {
            title: TITLE.to_string(),
            body: format!("There is new data on your timeline ({} entries)", entries),
            icon: ICON.to_string(),
            tag: TAG.to_string(),
            actions: vec![
                NotificationAction {
                    action: "show".to_string(),
                    title: "Show".to_string(),
                },
                NotificationAction {
                    action: "dismiss".to_string(),
                    title: "Dismiss".to_string(),
                },
            ],
        }
    }
}

/// Shows notifications to the user. Permission handling is the host's job.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
