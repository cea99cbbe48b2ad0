// 外部协作者接口：浏览器、页面观察、区块执行、持久化、Webhook、制品存储

mod artifacts;
mod browser;
mod executor;
mod observation;
mod persistence;
mod webhook;

pub use artifacts::ArtifactStore;
pub use browser::{BrowserProvider, BrowserSession, BLANK_PAGE};
pub use executor::{BlockExecutor, BlockInvocation};
pub use observation::{Observation, PageObserver};
pub use persistence::{MemoryPersistence, Persistence};
#[cfg(feature = "webhook-http")]
pub use webhook::HttpWebhookSender;
pub use webhook::{
    sign_payload, WebhookNotifier, WebhookSender, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
