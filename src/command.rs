use callbox::config::Config;
use callbox::descriptor::{Interface, MethodSpec, ParamSpec, ReturnKind};
use callbox::handlers::HandlerResolver;
use callbox::markers::{Body, Endpoint, Header, QueryParam, Request, Retry, Timeout};
use callbox::{Arg, CallOptions, ClientBuilder, Data};
use reqwest::{Method, Url};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::{CallArgs, OutputKind};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Describe the command line as a one-method interface and call it
pub async fn call(config: Config, args: CallArgs) -> Result<(), AnyError> {
    let url = Url::parse(&args.url)?;
    if url.cannot_be_a_base() {
        return Err(format!("{} is not an http url", args.url).into());
    }
    let method = Method::from_bytes(args.method.to_ascii_uppercase().as_bytes())?;

    // The path stays on the endpoint so it is sent exactly as given
    let mut base = url.clone();
    base.set_query(None);
    base.set_fragment(None);

    let returns = match args.output {
        OutputKind::Json => ReturnKind::Json,
        OutputKind::Text => ReturnKind::Text,
        OutputKind::Bytes => ReturnKind::Bytes,
    };
    let mut spec = MethodSpec::new("call", returns).marker(Request::new(method, "/"));
    for header in &args.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header '{}' is not in 'Name: value' form", header))?;
        spec = spec.marker(Header::new(name.trim(), value.trim()));
    }
    if let Some(retries) = args.retry {
        spec = spec.marker(Retry::default().max_retries(retries));
    }
    if let Some(timeout) = args.timeout {
        spec = spec.marker(Timeout::new(timeout.as_duration()));
    }

    let mut call_args = Vec::new();
    for (index, (name, value)) in url.query_pairs().enumerate() {
        spec = spec.param(
            ParamSpec::value(format!("query{}", index)).marker(QueryParam::named(name.into_owned())),
        );
        call_args.push(Arg::from(value.into_owned()));
    }
    if let Some(data) = &args.data {
        let (marker, arg) = if args.json {
            (Body::json(), Arg::Value(serde_json::from_str(data)?))
        } else {
            (Body::text(), Arg::from(data.as_str()))
        };
        spec = spec.param(ParamSpec::value("body").marker(marker));
        call_args.push(arg);
    }

    let interface = Interface::new("cli")
        .marker(Endpoint::url(base.as_str()))
        .method(spec);
    let client = ClientBuilder::new(config)
        .resolver(Arc::new(HandlerResolver::with_builtins()))
        .build(interface)?;

    let options = CallOptions::builder().maybe_trace_id(args.trace_id).build();
    let data = client.invoke_with("call", call_args, options).await?;
    info!(metrics = ?client.metrics().snapshot(), "call finished");

    let mut stdout = std::io::stdout().lock();
    match data {
        Some(Data::Json(value)) => writeln!(stdout, "{}", serde_json::to_string_pretty(&value)?)?,
        Some(Data::Text(text)) => writeln!(stdout, "{}", text)?,
        Some(Data::Bytes(bytes)) => stdout.write_all(&bytes)?,
        None => warn!("call returned no data"),
    }
    Ok(())
}

pub fn print_config(config: &Config) -> Result<(), AnyError> {
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
