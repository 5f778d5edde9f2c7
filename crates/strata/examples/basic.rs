//! Minimal application wiring: static files, body decoding, CORS, and a
//! router, with the error trap installed structurally by the dispatcher.
//!
//! Run with:
//!
//! ```sh
//! cargo run --example basic
//! ```

use http::StatusCode;
use strata::prelude::*;

fn hello<'a>(ctx: &'a mut Context, _params: Params) -> BoxFuture<'a, StrataResult<()>> {
    Box::pin(async move {
        ctx.response_mut().set_status(StatusCode::OK);
        ctx.response_mut().set_body("hello, world");
        Ok(())
    })
}

fn create_note<'a>(ctx: &'a mut Context, _params: Params) -> BoxFuture<'a, StrataResult<()>> {
    Box::pin(async move {
        let summary = match ctx.get_extension::<DecodedBody>() {
            Some(DecodedBody::Json(value)) => format!("stored note: {value}"),
            _ => "stored empty note".to_string(),
        };
        ctx.response_mut().set_status(StatusCode::CREATED);
        ctx.response_mut().set_body(summary);
        Ok(())
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&LogConfig::development())?;

    let mut registry = Registry::new();
    registry.register(StaticFiles::new("./public").index("index.html"))?;
    registry.register(BodyDecoder::new())?;
    registry.register(Cors::permissive())?;
    registry.register(
        Router::new()
            .get("/hello", hello)
            .post("/notes", create_note),
    )?;

    let dispatcher = Dispatcher::new(&registry, ErrorTrap::new());
    let config = ServerConfig::builder().http_addr("127.0.0.1:8080").build();

    Server::new(config, dispatcher).run().await?;
    Ok(())
}
