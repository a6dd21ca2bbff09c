use anyhow::Result;
use std::sync::Arc;

use rainbowchart::config::Config;
use rainbowchart::logging::{info, obj, v_str, Domain};
use rainbowchart::{server, upstream};

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();
    info(
        Domain::System,
        "startup",
        obj(&[
            ("version", v_str(env!("CARGO_PKG_VERSION"))),
            ("model", v_str(cfg.model.as_str())),
            ("bands", v_str(cfg.band_set.as_str())),
            ("upstream", v_str(&cfg.upstream_url)),
        ]),
    );

    let source = Arc::from(upstream::from_config(&cfg)?);
    server::serve(cfg, source).await
}
