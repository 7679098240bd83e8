use std::fmt::Display;

use kstamp::{
    configuration::{Configuration, Parser},
    receiver::run_receiver,
    sender::run_sender,
};
use tokio_util::sync::CancellationToken;

fn exit_with(e: impl Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();

    let conf = Configuration::parse();
    if let Err(e) = conf.validate() {
        exit_with(e);
    }
    let sender_options = if conf.responder {
        None
    } else {
        Some(conf.sender_options().unwrap_or_else(|e| exit_with(e)))
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, shutting down");
                cancel.cancel();
            }
        });
    }

    let result = match sender_options {
        Some(options) => run_sender(options, cancel).await,
        None => run_receiver(conf.receiver_options(), cancel).await,
    };

    if let Err(e) = result {
        exit_with(e);
    }
}
