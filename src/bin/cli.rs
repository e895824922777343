use clap::{App, Arg, ArgMatches, SubCommand};
use spatial_ingest::{
    config::{DEFAULT_FRAME_STRIDE, DEFAULT_SEGMENT_NAME, DEFAULT_SEGMENT_SIZE},
    error::IngestError,
    ring::HEADER_SIZE,
    Backend, DeviceDestination, ExecutionRequest, InstanceConfig, ModelLifecycle,
    NormalizedSample, Outcome, RawStylusSample, RegistrationMode, Result, RingBufferConfig,
    RingBufferHandle, SegmentBacking, SegmentWriter,
};
use std::{str::FromStr, time::Instant};

fn main() -> Result<()> {
    env_logger::init();

    let segment_args = || {
        vec![
            Arg::with_name("name")
                .short("n")
                .long("name")
                .value_name("NAME")
                .help("Shared memory segment name")
                .default_value(DEFAULT_SEGMENT_NAME)
                .takes_value(true),
            Arg::with_name("file")
                .short("f")
                .long("file")
                .value_name("FILE")
                .help("Use a file-backed segment at this path")
                .takes_value(true),
            Arg::with_name("size")
                .short("s")
                .long("size")
                .value_name("SIZE")
                .help("Segment size in bytes, header included")
                .takes_value(true),
        ]
    };

    let matches = App::new("spatial-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Spatial ingest ring and stylus tooling")
        .subcommand(
            SubCommand::with_name("inspect")
                .about("Print the header of a ring segment")
                .args(&segment_args()),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Run a simulated producer against a passthrough instance")
                .args(&segment_args())
                .arg(
                    Arg::with_name("stride")
                        .long("stride")
                        .value_name("BYTES")
                        .help("Frame stride")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("frames")
                        .short("c")
                        .long("frames")
                        .value_name("COUNT")
                        .help("Number of frames to publish")
                        .default_value("1000")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("keep")
                        .long("keep")
                        .help("Leave the shared memory segment in place for inspect"),
                ),
        )
        .subcommand(
            SubCommand::with_name("normalize")
                .about("Normalize one raw stylus sample")
                .arg(Arg::with_name("x").long("x").takes_value(true).default_value("0"))
                .arg(Arg::with_name("y").long("y").takes_value(true).default_value("0"))
                .arg(
                    Arg::with_name("pressure")
                        .short("p")
                        .long("pressure")
                        .takes_value(true)
                        .required(true),
                )
                .arg(
                    Arg::with_name("angle")
                        .short("a")
                        .long("angle")
                        .help("Tilt angle in degrees")
                        .takes_value(true)
                        .default_value("0"),
                )
                .arg(
                    Arg::with_name("magnitude")
                        .short("m")
                        .long("magnitude")
                        .help("Tilt magnitude, 0-255")
                        .takes_value(true)
                        .default_value("0"),
                ),
        )
        .subcommand(SubCommand::with_name("info").about("Show version and build information"))
        .get_matches();

    match matches.subcommand() {
        ("inspect", Some(inspect_matches)) => inspect(inspect_matches),
        ("simulate", Some(simulate_matches)) => simulate(simulate_matches),
        ("normalize", Some(normalize_matches)) => normalize(normalize_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<Option<T>> {
    match matches.value_of(name) {
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| IngestError::invalid_parameter(name, format!("Invalid value '{}'", value))),
        None => Ok(None),
    }
}

fn required_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    parse_arg(matches, name)?
        .ok_or_else(|| IngestError::invalid_parameter(name, "Missing value"))
}

fn segment_config(matches: &ArgMatches) -> Result<RingBufferConfig> {
    let name = matches.value_of("name").unwrap_or(DEFAULT_SEGMENT_NAME);
    let size = parse_arg(matches, "size")?.unwrap_or(DEFAULT_SEGMENT_SIZE);
    let config = RingBufferConfig::new(name, size);
    Ok(match matches.value_of("file") {
        Some(path) => config.with_file_path(path),
        None => config.with_backing(SegmentBacking::PosixShm),
    })
}

fn inspect(matches: &ArgMatches) -> Result<()> {
    let config = segment_config(matches)?;
    let handle = RingBufferHandle::open_mapped(config)?;
    let geometry = handle.geometry()?;

    println!("Segment: {}", handle.name());
    println!("  Backing: {}", handle.config().backing.name());
    println!("  Mapped: {} bytes", handle.mapped_len());
    println!("  Capacity: {} bytes", geometry.capacity);
    println!("  Frame stride: {} bytes", geometry.frame_stride);
    println!("  Frames per lap: {}", geometry.frames_per_lap());
    println!("  Write cursor: {}", handle.write_cursor()?);
    Ok(())
}

fn simulate(matches: &ArgMatches) -> Result<()> {
    let config = segment_config(matches)?;
    let stride: u32 = parse_arg(matches, "stride")?.unwrap_or(DEFAULT_FRAME_STRIDE);
    let frames: usize = required_arg(matches, "frames")?;
    if stride == 0 {
        return Err(IngestError::invalid_parameter("stride", "Frame stride must be greater than 0"));
    }

    let payload = config.size.saturating_sub(HEADER_SIZE) as u64;
    let capacity = payload - payload % stride as u64;
    let mut writer = SegmentWriter::create(config.clone(), capacity, stride)?;
    if matches.is_present("keep") {
        writer = writer.persist();
    }

    let backend = Backend::passthrough();
    let instance_config =
        InstanceConfig::new("simulate", config).with_registration(RegistrationMode::Passthrough);
    let mut instance = backend.initialize(instance_config)?;

    println!("Simulating {} frames of {} bytes...", frames, stride);

    let frame = vec![0xA5u8; stride as usize];
    let mut descriptor = [0u8; 24];
    let mut latencies = Vec::with_capacity(frames);

    for _ in 0..frames {
        writer.write_frame(&frame)?;

        let start = Instant::now();
        let mut requests = [ExecutionRequest::lidar(DeviceDestination::from_slice(
            &mut descriptor,
        ))];
        let result = backend.execute(&mut instance, &mut requests);
        latencies.push(start.elapsed().as_secs_f64() * 1e6);

        if let Some(Outcome::Failed(kind)) = result.get(0).map(|r| r.outcome) {
            println!("  request failed: {}", kind.name());
        }
    }

    let stats = instance.stats().clone();
    backend.finalize(instance)?;
    let pins = backend.registry().stats();

    latencies.sort_by(|a, b| a.total_cmp(b));
    let avg = latencies.iter().sum::<f64>() / latencies.len().max(1) as f64;
    let p99 = latencies
        .get((latencies.len() * 99 / 100).min(latencies.len().saturating_sub(1)))
        .copied()
        .unwrap_or(0.0);

    println!("\nResults:");
    println!("  Frames delivered: {}", stats.frames_delivered);
    println!("  Data loss events: {}", stats.data_loss_events);
    println!("  Frames dropped: {}", stats.frames_dropped);
    println!("  Average latency: {:.2}μs", avg);
    println!("  P99 latency: {:.2}μs", p99);
    println!("  Success rate: {:.2}%", stats.success_rate() * 100.0);
    println!("  Pin registrations: {}", pins.registrations);
    println!("  Pins still active: {}", pins.active_registrations());
    println!("  Pin cache hit rate: {:.2}%", pins.hit_rate() * 100.0);
    Ok(())
}

fn normalize(matches: &ArgMatches) -> Result<()> {
    let raw = RawStylusSample::new(
        required_arg(matches, "x")?,
        required_arg(matches, "y")?,
        required_arg(matches, "pressure")?,
        required_arg(matches, "angle")?,
        required_arg(matches, "magnitude")?,
    );
    let (x, y, vx, vy, pressure) = NormalizedSample::from_raw(&raw).as_tuple();

    println!("x: {}", x);
    println!("y: {}", y);
    println!("vx: {:.6}", vx);
    println!("vy: {:.6}", vy);
    println!("pressure: {:.6}", pressure);
    Ok(())
}

fn show_info() -> Result<()> {
    println!("Spatial Ingest v{}", spatial_ingest::VERSION);
    println!("Zero-copy LiDAR ring and stylus ingestion for GPU inference");
    println!();
    println!("Defaults:");
    println!("  Segment: {}", DEFAULT_SEGMENT_NAME);
    println!("  Segment size: {} bytes", DEFAULT_SEGMENT_SIZE);
    println!("  Header size: {} bytes", HEADER_SIZE);
    println!("  Frame stride: {} bytes", DEFAULT_FRAME_STRIDE);
    println!();
    println!("Platform:");
    println!("  OS: {}", std::env::consts::OS);
    println!("  Architecture: {}", std::env::consts::ARCH);
    Ok(())
}
