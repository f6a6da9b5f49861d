extern crate clap;
extern crate minion;
extern crate react;

#[cfg(target_os = "linux")]
fn main() {
    // process::exit skips destructors; react_main owns every logger
    let code = react_main();
    std::process::exit(code)
}

#[cfg(target_os = "linux")]
fn react_main() -> i32 {
    use clap::{value_t, App, Arg};
    use minion::Cancellable;
    use react::controller::ControllerConfig;
    use react::phy::Standard;
    use react::{ReactConfig, Runtime};
    use slog::{error, info};

    let matches = App::new("react")
        .version("0.1")
        .about("Decentralized airtime fairness by contention window tuning")
        .arg(
            Arg::with_name("iface")
                .short("i")
                .long("iface")
                .help("Wireless interface to tune")
                .default_value("wlan0"),
        )
        .arg(
            Arg::with_name("tdelay")
                .short("t")
                .long("tdelay")
                .help("Seconds between control broadcasts")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("iperf_rate")
                .short("r")
                .long("iperf_rate")
                .help("Offered application load in kbps")
                .default_value("0"),
        )
        .arg(
            Arg::with_name("enable_react")
                .short("e")
                .long("enable_react")
                .help("Write contention windows to the driver; without it decisions are only logged"),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .help("UDP port for control broadcasts")
                .default_value("2323"),
        )
        .arg(
            Arg::with_name("sleep_time")
                .short("s")
                .long("sleep_time")
                .help("Seconds between contention window updates")
                .default_value("1"),
        )
        .arg(
            Arg::with_name("standard")
                .long("standard")
                .help("802.11 PHY timing to assume")
                .possible_values(&["11a", "11b", "11g", "11p"])
                .default_value("11g"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .required(false),
        )
        .get_matches();

    let log = react::make_logger(matches.is_present("verbose"));

    let i_time = value_t!(matches.value_of("tdelay"), f64).unwrap_or_else(|e| e.exit());
    let sleep_time = value_t!(matches.value_of("sleep_time"), f64).unwrap_or_else(|e| e.exit());
    if i_time <= 0.0 || sleep_time <= 0.0 {
        error!(log, "periods must be positive"; "tdelay" => i_time, "sleep_time" => sleep_time);
        return 2;
    }

    let standard = value_t!(matches.value_of("standard"), Standard).unwrap_or_else(|e| e.exit());
    let cfg = ReactConfig {
        iface: String::from(matches.value_of("iface").unwrap_or("wlan0")),
        port: value_t!(matches.value_of("port"), u16).unwrap_or_else(|e| e.exit()),
        i_time,
        sleep_time,
        iperf_rate_kbps: value_t!(matches.value_of("iperf_rate"), f64).unwrap_or_else(|e| e.exit()),
        enable_react: matches.is_present("enable_react"),
        standard,
        controller: ControllerConfig::for_standard(standard),
        ..Default::default()
    };

    info!(log, "starting react"; "iface" => &cfg.iface, "enable_react" => cfg.enable_react);

    let mut r = match Runtime::new(log.clone(), cfg) {
        Ok(r) => r,
        Err(e) => {
            error!(log, "setup failed"; "err" => %e);
            return 1;
        }
    };

    match r.run() {
        Ok(()) => 0,
        Err(e) => {
            error!(log, "runtime exited"; "err" => %e);
            1
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn main() {
    println!("Runs on Linux only")
}
