use clap::Args;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, api::ListParams};
use snafu::ResultExt;
use tokio::io::AsyncWriteExt;

use crate::{
    cli::error::{self, Error},
    ui::table::NodeListExt,
};

#[derive(Args, Clone)]
pub struct NodesCommand {
    #[arg(
        short = 'l',
        long = "selector",
        help = "Label selector to filter nodes (e.g. `node-role.kubernetes.io/worker=`)."
    )]
    pub selector: Option<String>,
}

impl NodesCommand {
    pub async fn run(self, kube_client: kube::Client) -> Result<(), Error> {
        let Self { selector } = self;

        let list_params = ListParams { label_selector: selector, ..ListParams::default() };
        let nodes = Api::<Node>::all(kube_client)
            .list(&list_params)
            .await
            .context(error::ListNodesSnafu)?;

        let mut stdout = tokio::io::stdout();
        stdout.write_all(nodes.render_table().as_bytes()).await.context(error::WriteStdoutSnafu)?;
        stdout.write_u8(b'\n').await.context(error::WriteStdoutSnafu)
    }
}
