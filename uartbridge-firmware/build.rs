//! Build script for uartbridge-firmware
//!
//! - Validates bridge.toml at compile time
//! - Writes memory.x so the firmware image stops where the sector store begins
//! - Generates `config.rs` with the validated values

use std::env;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Native sector size of the flash store
const SECTOR_SIZE: i64 = 4096;
/// Flash fitted on the Raspberry Pi Pico
const FLASH_SIZE: i64 = 2 * 1024 * 1024;
/// Flash kept for the boot stage and the firmware image
const FIRMWARE_RESERVED: i64 = 512 * 1024;
/// Second-stage bootloader at the start of flash
const BOOT2_SIZE: i64 = 0x100;
/// Smallest store that still holds a partition table and a FAT12 volume
const MIN_SECTORS: i64 = 16;

fn main() {
    let config = validate_config();
    setup_linker(&config);
    generate_config(&config);
}

/// Write memory.x and set up linker search paths
///
/// The FLASH region ends where the sector store begins, so the linker
/// refuses an image that would overlap it.
fn setup_linker(config: &toml::Value) {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let sectors = section(config, "storage")
        .get("sector_count")
        .and_then(|v| v.as_integer())
        .unwrap_or_else(|| panic!("storage.sector_count missing after validation"));
    let image = FLASH_SIZE - sectors * SECTOR_SIZE - BOOT2_SIZE;

    let memory_x = format!(
        "MEMORY {{\n\
        \x20   BOOT2 : ORIGIN = 0x10000000, LENGTH = {:#x}\n\
        \x20   FLASH : ORIGIN = {:#x}, LENGTH = {:#x}\n\
        \x20   RAM   : ORIGIN = 0x20000000, LENGTH = 256K\n\
        }}\n",
        BOOT2_SIZE,
        0x1000_0000 + BOOT2_SIZE,
        image,
    );
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x.as_bytes()).unwrap();

    // Tell rustc where to find memory.x
    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rustc-link-arg-bins=--nmagic");
    println!("cargo:rustc-link-arg-bins=-Tlink.x");
    println!("cargo:rustc-link-arg-bins=-Tlink-rp.x");
    println!("cargo:rustc-link-arg-bins=-Tdefmt.x");

    println!("cargo:rerun-if-changed=build.rs");
}

/// Validate bridge.toml at compile time
fn validate_config() -> toml::Value {
    println!("cargo:rerun-if-changed=bridge.toml");

    let config_path = Path::new("bridge.toml");

    if !config_path.exists() {
        panic!(
            "\n\
            ╔══════════════════════════════════════════════════════════════════╗\n\
            ║  ERROR: bridge.toml not found!                                   ║\n\
            ║                                                                  ║\n\
            ║  The firmware requires a bridge.toml configuration file.         ║\n\
            ║  Please create one in the uartbridge-firmware directory.         ║\n\
            ╚══════════════════════════════════════════════════════════════════╝\n"
        );
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Failed to read bridge.toml                               ║\n\
                ║                                                                  ║\n\
                ║  Error: {:<56} ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                e
            );
        }
    };

    let config: toml::Value = match toml::from_str(&config_content) {
        Ok(value) => value,
        Err(e) => {
            let error_msg = e.to_string();
            panic!(
                "\n\
                ╔══════════════════════════════════════════════════════════════════╗\n\
                ║  ERROR: Invalid TOML syntax in bridge.toml                       ║\n\
                ╠══════════════════════════════════════════════════════════════════╣\n\
                ║                                                                  ║\n\
                {}\n\
                ║                                                                  ║\n\
                ╚══════════════════════════════════════════════════════════════════╝\n",
                format_error_lines(&error_msg)
            );
        }
    };

    let mut errors = Vec::new();
    for section in ["usb", "uart", "storage", "msc"] {
        match config.get(section) {
            Some(toml::Value::Table(_)) => {}
            Some(_) => errors.push(format!("[{}] must be a table", section)),
            None => errors.push(format!("Missing [{}] section", section)),
        }
    }
    report("Missing required sections in bridge.toml", &errors);

    validate_usb(&config);
    validate_uart(&config);
    validate_storage(&config);
    validate_msc(&config);

    println!("cargo:warning=bridge.toml validated successfully");
    config
}

/// Format error message lines with box drawing
fn format_error_lines(msg: &str) -> String {
    msg.lines()
        .map(|line| {
            let truncated = if line.len() > 64 {
                format!("{}...", &line[..61])
            } else {
                line.to_string()
            };
            format!("║  {:<64} ║", truncated)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Abort the build with every collected error
fn report(title: &str, errors: &[String]) {
    if errors.is_empty() {
        return;
    }
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title,
        errors
            .iter()
            .map(|e| format!("║  • {:<62} ║", e))
            .collect::<Vec<_>>()
            .join("\n")
    );
}

fn section<'a>(config: &'a toml::Value, name: &str) -> &'a toml::value::Table {
    config
        .get(name)
        .and_then(|v| v.as_table())
        .unwrap_or_else(|| panic!("[{}] section missing after validation", name))
}

/// Check an integer field is present and within `min..=max`
fn check_int(errors: &mut Vec<String>, table: &toml::value::Table, path: &str, min: i64, max: i64) {
    let key = path.rsplit('.').next().unwrap_or(path);
    match table.get(key) {
        Some(toml::Value::Integer(v)) if (min..=max).contains(v) => {}
        Some(toml::Value::Integer(_)) => {
            errors.push(format!("{} must be {}-{}", path, min, max));
        }
        Some(_) => errors.push(format!("{} must be an integer", path)),
        None => errors.push(format!("missing '{}'", path)),
    }
}

/// Check a string field is present, non-empty and at most `max` bytes
fn check_str(errors: &mut Vec<String>, table: &toml::value::Table, path: &str, max: usize) {
    let key = path.rsplit('.').next().unwrap_or(path);
    match table.get(key) {
        Some(toml::Value::String(s)) if s.is_empty() => {
            errors.push(format!("{} cannot be empty", path));
        }
        Some(toml::Value::String(s)) if s.len() > max => {
            errors.push(format!("{} longer than {} bytes", path, max));
        }
        Some(toml::Value::String(s)) if !s.is_ascii() => {
            errors.push(format!("{} must be ASCII", path));
        }
        Some(toml::Value::String(_)) => {}
        Some(_) => errors.push(format!("{} must be a string", path)),
        None => errors.push(format!("missing '{}'", path)),
    }
}

fn validate_usb(config: &toml::Value) {
    let usb = section(config, "usb");
    let mut errors = Vec::new();

    check_int(&mut errors, usb, "usb.vendor_id", 0, 0xFFFF);
    check_int(&mut errors, usb, "usb.product_id", 0, 0xFFFF);
    check_int(&mut errors, usb, "usb.device_release", 0, 0xFFFF);
    check_int(&mut errors, usb, "usb.max_power_ma", 0, 500);
    check_str(&mut errors, usb, "usb.manufacturer", 126);
    check_str(&mut errors, usb, "usb.product", 126);
    check_str(&mut errors, usb, "usb.serial_number", 126);

    report("Invalid [usb] configuration", &errors);
}

fn validate_uart(config: &toml::Value) {
    let uart = section(config, "uart");
    let mut errors = Vec::new();

    check_int(&mut errors, uart, "uart.baudrate", 1, 7_812_500);
    check_int(&mut errors, uart, "uart.bootloader_baudrate", 1, u32::MAX as i64);
    check_int(&mut errors, uart, "uart.data_bits", 7, 8);
    check_int(&mut errors, uart, "uart.stop_bits", 1, 2);
    match uart.get("parity") {
        Some(toml::Value::String(p)) if ["none", "even", "odd"].contains(&p.as_str()) => {}
        Some(_) => errors.push("uart.parity must be 'none', 'even', or 'odd'".to_string()),
        None => errors.push("missing 'uart.parity'".to_string()),
    }
    if uart.get("baudrate") == uart.get("bootloader_baudrate") {
        errors.push("uart.baudrate cannot equal uart.bootloader_baudrate".to_string());
    }

    report("Invalid [uart] configuration", &errors);
}

fn validate_storage(config: &toml::Value) {
    let storage = section(config, "storage");
    let mut errors = Vec::new();

    check_int(
        &mut errors,
        storage,
        "storage.sector_count",
        MIN_SECTORS,
        (FLASH_SIZE - FIRMWARE_RESERVED) / SECTOR_SIZE,
    );
    check_int(&mut errors, storage, "storage.start_delay_ms", 0, 60_000);

    report("Invalid [storage] configuration", &errors);
}

fn validate_msc(config: &toml::Value) {
    let msc = section(config, "msc");
    let mut errors = Vec::new();

    check_str(&mut errors, msc, "msc.vendor", 8);
    check_str(&mut errors, msc, "msc.product", 16);
    check_str(&mut errors, msc, "msc.revision", 4);
    match msc.get("block_size") {
        Some(toml::Value::Integer(n)) if [512, 1024, 2048, SECTOR_SIZE].contains(n) => {}
        Some(_) => errors.push("msc.block_size must be 512, 1024, 2048 or 4096".to_string()),
        None => errors.push("missing 'msc.block_size'".to_string()),
    }
    match msc.get("writable") {
        Some(toml::Value::Boolean(_)) => {}
        Some(_) => errors.push("msc.writable must be true or false".to_string()),
        None => errors.push("missing 'msc.writable'".to_string()),
    }

    report("Invalid [msc] configuration", &errors);
}

/// Write the validated values as Rust constants into `OUT_DIR/config.rs`
fn generate_config(config: &toml::Value) {
    let int = |sec: &str, key: &str| -> i64 {
        section(config, sec)
            .get(key)
            .and_then(|v| v.as_integer())
            .unwrap_or_else(|| panic!("{}.{} missing after validation", sec, key))
    };
    let string = |sec: &str, key: &str| -> String {
        section(config, sec)
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| format!("{:?}", s))
            .unwrap_or_else(|| panic!("{}.{} missing after validation", sec, key))
    };
    let parity = match section(config, "uart").get("parity").and_then(|v| v.as_str()) {
        Some("even") => "Parity::Even",
        Some("odd") => "Parity::Odd",
        _ => "Parity::None",
    };
    let data_bits = if int("uart", "data_bits") == 7 {
        "DataBits::Seven"
    } else {
        "DataBits::Eight"
    };
    let stop_bits = if int("uart", "stop_bits") == 2 {
        "StopBits::Two"
    } else {
        "StopBits::One"
    };
    let writable = section(config, "msc")
        .get("writable")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);

    let code = format!(
        "// Generated from bridge.toml by build.rs\n\
        \n\
        pub const USB_VENDOR_ID: u16 = {:#06x};\n\
        pub const USB_PRODUCT_ID: u16 = {:#06x};\n\
        pub const USB_DEVICE_RELEASE: u16 = {:#06x};\n\
        pub const USB_MAX_POWER_MA: u16 = {};\n\
        pub const USB_MANUFACTURER: &str = {};\n\
        pub const USB_PRODUCT: &str = {};\n\
        pub const USB_SERIAL_NUMBER: &str = {};\n\
        \n\
        pub const UART_BAUDRATE: u32 = {};\n\
        pub const UART_DATA_BITS: DataBits = {};\n\
        pub const UART_PARITY: Parity = {};\n\
        pub const UART_STOP_BITS: StopBits = {};\n\
        pub const UART_BOOTLOADER_BAUDRATE: u32 = {};\n\
        \n\
        pub const STORAGE_SECTOR_COUNT: u32 = {};\n\
        pub const STORAGE_START_DELAY_MS: u32 = {};\n\
        \n\
        pub const MSC_VENDOR: &str = {};\n\
        pub const MSC_PRODUCT: &str = {};\n\
        pub const MSC_REVISION: &str = {};\n\
        pub const MSC_BLOCK_SIZE: u32 = {};\n\
        pub const MSC_WRITABLE: bool = {};\n",
        int("usb", "vendor_id"),
        int("usb", "product_id"),
        int("usb", "device_release"),
        int("usb", "max_power_ma"),
        string("usb", "manufacturer"),
        string("usb", "product"),
        string("usb", "serial_number"),
        int("uart", "baudrate"),
        data_bits,
        parity,
        stop_bits,
        int("uart", "bootloader_baudrate"),
        int("storage", "sector_count"),
        int("storage", "start_delay_ms"),
        string("msc", "vendor"),
        string("msc", "product"),
        string("msc", "revision"),
        int("msc", "block_size"),
        writable,
    );

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    fs::write(out_dir.join("config.rs"), code).unwrap();
}
