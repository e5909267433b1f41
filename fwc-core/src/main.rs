use std::fs;
use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{bail, format_err, Context, Error};

use fwc_model::firewall::common::{Model, ParserConfig};
use fwc_model::firewall::types::device::{EngineVersion, Kind, Platform};
use fwc_model::firewall::types::interface::Interface;
use fwc_model::firewall::types::rule::AddressFamily;
use fwc_model::Id;

use fwc_core::config::{
    AttachedNetworksPreprocessor, DeviceSource, DomainModelLoader, Preprocessor,
    TextDomainModelLoader,
};
use fwc_core::diagnostics::summarize;
use fwc_core::driver::{compile_device, CompileOptions, PlainScriptAssembler, ScriptAssembler, ScriptMetadata};

struct Args {
    config: PathBuf,
    output: Option<PathBuf>,
    family: AddressFamily,
    platform: Platform,
    rule: Option<u32>,
    check_shading: bool,
    interfaces: Vec<String>,
    name: String,
    watch: bool,
}

const USAGE: &str = "\
fwc --config <path> [OPTIONS]

OPTIONS:
    --config <path>         firewall config file to compile (required)
    --output <path>         write the assembled script here instead of stdout
    --family <v4|v6|both>   address family to compile for (default: both)
    --platform <ipt|nft>    target backend (default: ipt)
    --rule <n>              compile only the rule at this absolute position
    --check-shading         enable shadowed-rule detection (§4.6)
    --interface <name>      interface available to this device (repeatable)
    --name <name>           firewall name used in the generated header
    --watch                 recompile on SIGHUP until interrupted
";

fn parse_args() -> Result<Args, Error> {
    let mut pargs = pico_args::Arguments::from_env();

    if pargs.contains(["-h", "--help"]) {
        print!("{USAGE}");
        std::process::exit(0);
    }

    let family = match pargs.opt_value_from_str::<_, String>("--family")? {
        Some(s) => parse_family(&s)?,
        None => AddressFamily::Both,
    };
    let platform = match pargs.opt_value_from_str::<_, String>("--platform")? {
        Some(s) => parse_platform(&s)?,
        None => Platform::Ipt,
    };

    let mut interfaces = Vec::new();
    while let Some(name) = pargs.opt_value_from_str::<_, String>("--interface")? {
        interfaces.push(name);
    }

    let args = Args {
        config: pargs.value_from_str("--config").context("missing required --config <path>")?,
        output: pargs.opt_value_from_str("--output")?,
        family,
        platform,
        rule: pargs.opt_value_from_str("--rule")?,
        check_shading: pargs.contains("--check-shading"),
        interfaces,
        name: pargs.opt_value_from_str("--name")?.unwrap_or_else(|| "localhost".to_string()),
        watch: pargs.contains("--watch"),
    };

    let remaining = pargs.finish();
    if !remaining.is_empty() {
        bail!("unrecognized arguments: {remaining:?}");
    }

    Ok(args)
}

fn parse_family(s: &str) -> Result<AddressFamily, Error> {
    match s {
        "v4" => Ok(AddressFamily::V4),
        "v6" => Ok(AddressFamily::V6),
        "both" => Ok(AddressFamily::Both),
        other => bail!("invalid --family {other:?}, expected v4, v6, or both"),
    }
}

fn parse_platform(s: &str) -> Result<Platform, Error> {
    match s {
        "ipt" => Ok(Platform::Ipt),
        "nft" => Ok(Platform::Nft),
        other => bail!("invalid --platform {other:?}, expected ipt or nft"),
    }
}

fn load_model(args: &Args, device_id: Id) -> Result<Model, Error> {
    let config_text = fs::read_to_string(&args.config)
        .with_context(|| format!("reading firewall config at {}", args.config.display()))?;

    let source = DeviceSource {
        id: device_id,
        name: args.name.clone(),
        kind: Kind::Host,
        platform: args.platform,
        version: EngineVersion::new(1, 4, 21, 0),
        interfaces: args.interfaces.iter().map(Interface::new).collect(),
        config_text,
    };

    let loader = TextDomainModelLoader::new(vec![source], ParserConfig::default());
    let mut model = loader.load()?;
    AttachedNetworksPreprocessor.prepare(&mut model, args.family)?;
    Ok(model)
}

fn run_once(args: &Args) -> Result<i32, Error> {
    let device_id = Id::generate();
    let Model { arena, mut devices } = load_model(args, device_id)?;
    let device = devices
        .remove(&device_id)
        .ok_or_else(|| format_err!("device {device_id} missing from loaded model"))?;

    let opts = CompileOptions {
        family: args.family,
        check_shading: args.check_shading,
        single_rule: args.rule,
    };

    let output = compile_device(arena, &device, &opts);

    for diagnostic in &output.diagnostics {
        eprintln!("{diagnostic}");
    }

    let meta = ScriptMetadata {
        firewall_name: device.name.clone(),
        platform: device.platform,
        tool_path: "/usr/sbin/fwc".to_string(),
        user: std::env::var("USER").unwrap_or_else(|_| "root".to_string()),
        timestamp: "unknown".to_string(),
    };
    let script = PlainScriptAssembler.assemble(&output, &meta);

    match &args.output {
        Some(path) => {
            let mut file = fs::File::create(path)
                .with_context(|| format!("creating output file at {}", path.display()))?;
            file.write_all(script.as_bytes())?;
        }
        None => print!("{script}"),
    }

    Ok(summarize(&output.diagnostics).exit_code())
}

/// Recompiles on a fixed interval until SIGTERM/SIGINT, matching the
/// teacher's `bin/proxmox-firewall.rs` poll-and-signal-flag loop rather than
/// a SIGHUP-triggered reload (the teacher never wires SIGHUP - it just polls).
fn watch(args: &Args) -> Result<i32, Error> {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    let term = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&term))
        .context("registering SIGTERM handler")?;
    signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&term))
        .context("registering SIGINT handler")?;

    let mut code = 0;
    while !term.load(Ordering::Relaxed) {
        let start = Instant::now();
        code = run_once(args)?;
        log::info!("recompile took {}ms", start.elapsed().as_millis());
        std::thread::sleep(Duration::from_secs(5));
    }

    Ok(code)
}

fn main() -> Result<(), Error> {
    env_logger::init();

    let args = parse_args()?;
    let code = if args.watch { watch(&args)? } else { run_once(&args)? };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
