use std::future::Future;

use qrc_rpc::{Connector, RpcClient};
use qrc_types::{ComponentControls, ComponentDescriptor};

/// The calls the diagnostics engine makes against a Core.
pub trait CoreApi: Send + Sync {
    fn components(
        &self,
    ) -> impl Future<Output = qrc_rpc::Result<Vec<ComponentDescriptor>>> + Send;

    fn controls(
        &self,
        component: &str,
    ) -> impl Future<Output = qrc_rpc::Result<ComponentControls>> + Send;

    /// Reload a script or plugin
    fn reload(&self, component: &str) -> impl Future<Output = qrc_rpc::Result<()>> + Send;
}

impl<C: Connector> CoreApi for RpcClient<C> {
    async fn components(&self) -> qrc_rpc::Result<Vec<ComponentDescriptor>> {
        self.get_components().await
    }

    async fn controls(&self, component: &str) -> qrc_rpc::Result<ComponentControls> {
        self.get_controls(component).await
    }

    async fn reload(&self, component: &str) -> qrc_rpc::Result<()> {
        RpcClient::reload(self, component).await.map(|_| ())
    }
}
