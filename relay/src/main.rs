use gatling_influx_runner::prelude::{init, run};

fn main() -> anyhow::Result<()> {
    let cli = init();

    run(cli)
}
