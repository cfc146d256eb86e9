use crux_core::capability::{Capability, CapabilityContext, Operation};
use serde::{Deserialize, Serialize};

/// Fire-and-forget hand-off to the platform (deep links, browser tabs).
/// The shell reports nothing back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "op", content = "data")]
pub enum ExternalOperation {
    /// Open `url` once `delay_ms` has elapsed since the effect was received.
    Open { url: String, delay_ms: u64 },
}

impl Operation for ExternalOperation {
    type Output = ();
}

pub struct External<Ev> {
    context: CapabilityContext<ExternalOperation, Ev>,
}

impl<Ev> Capability<Ev> for External<Ev> {
    type Operation = ExternalOperation;
    type MappedSelf<MappedEv> = External<MappedEv>;

    fn map_event<F, NewEv>(&self, f: F) -> Self::MappedSelf<NewEv>
    where
        F: Fn(NewEv) -> Ev + Send + Sync + 'static,
        Ev: 'static,
        NewEv: 'static + Send,
    {
        External::new(self.context.map_event(f))
    }
}

impl<Ev> External<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ExternalOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn open_after(&self, url: String, delay_ms: u64) {
        let context = self.context.clone();
        self.context.spawn(async move {
            context
                .notify_shell(ExternalOperation::Open { url, delay_ms })
                .await;
        });
    }
}
