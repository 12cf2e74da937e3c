use std::env;

use inquire::Select;
use manson_psu::{
    emulator::EmulatedSerial,
    error::Result,
    models::Catalog,
    psu::MansonPsu,
    transport::Transport,
    types::{Quantity, State},
};
use serialport::{ClearBuffer, SerialPort};

// Configuration constants - adjust these for your setup
const BAUD_RATE: u32 = 9600;
// Responses are complete well within this, a timeout ends each read.
const SERIAL_TIMEOUT_MS: u64 = 100;
const EMULATED_PORT: &str = "Emulated SSP-9081";
const OUTPUT_VOLTAGE: f64 = 5.5;
const CURRENT_LIMIT: f64 = 0.1;
const STABILIZATION_DELAY_MS: u64 = 1000;

pub struct PortWrapper(Box<dyn SerialPort>);

#[derive(Debug)]
pub struct IoError(std::io::Error);

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for IoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl embedded_io::Error for IoError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
            std::io::ErrorKind::NotConnected => embedded_io::ErrorKind::NotConnected,
            std::io::ErrorKind::BrokenPipe => embedded_io::ErrorKind::BrokenPipe,
            std::io::ErrorKind::InvalidInput => embedded_io::ErrorKind::InvalidInput,
            std::io::ErrorKind::InvalidData => embedded_io::ErrorKind::InvalidData,
            std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
            std::io::ErrorKind::Interrupted => embedded_io::ErrorKind::Interrupted,
            std::io::ErrorKind::Unsupported => embedded_io::ErrorKind::Unsupported,
            _ => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for PortWrapper {
    type Error = IoError;
}

impl embedded_io::Read for PortWrapper {
    fn read(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        std::io::Read::read(&mut self.0, buf).map_err(IoError)
    }
}

impl embedded_io::Write for PortWrapper {
    fn write(&mut self, buf: &[u8]) -> core::result::Result<usize, Self::Error> {
        std::io::Write::write(&mut self.0, buf).map_err(IoError)
    }

    fn flush(&mut self) -> core::result::Result<(), Self::Error> {
        std::io::Write::flush(&mut self.0).map_err(IoError)
    }
}

impl Transport for PortWrapper {
    fn discard_input(&mut self) -> core::result::Result<(), Self::Error> {
        self.0
            .clear(ClearBuffer::Input)
            .map_err(|e| IoError(std::io::Error::from(e)))
    }
}

fn run<S: Transport>(psu: &mut MansonPsu<S>) -> Result<(), S::Error> {
    println!("Product model: {}", psu.get_hw_model()?);
    println!("Firmware version: {}", psu.get_hw_version()?);
    println!("{:#?}", psu.hw_specs());

    // Set output voltage and current limit
    psu.set_preset_voltage_current(OUTPUT_VOLTAGE, CURRENT_LIMIT)?;
    println!(
        "Set output to {}V, {}A",
        psu.round_value(OUTPUT_VOLTAGE, Quantity::Voltage)?,
        psu.round_value(CURRENT_LIMIT, Quantity::Current)?
    );

    // Enable the output
    psu.set_output_state(State::On)?;
    println!("Output enabled");

    // Wait for output to stabilize
    std::thread::sleep(std::time::Duration::from_millis(STABILIZATION_DELAY_MS));

    // Measure and display the output
    println!("Measured output: {:#?}", psu.read_output()?);

    println!("\n--- Memory Presets ---");
    for index in 0..psu.hw_specs().real_preset_slots as usize {
        match psu.load_memory_preset(index) {
            Ok(preset) => println!("M{}: {:?}", index + 1, preset),
            Err(e) => println!("M{}: {}", index + 1, e),
        }
    }

    psu.set_output_state(State::Off)?;
    println!("\nOutput disabled");
    Ok(())
}

fn main() {
    // Get serial port from command line arg or interactive selection
    let port_name = env::args().nth(1).unwrap_or_else(|| {
        let mut port_names: Vec<String> = serialport::available_ports()
            .expect("Failed to enumerate serial ports")
            .into_iter()
            .map(|p| p.port_name)
            .collect();
        port_names.push(EMULATED_PORT.to_string());

        // Interactive selection
        Select::new("Select a serial port:", port_names)
            .prompt()
            .expect("Failed to select port")
    });

    println!("Using port: {}", port_name);

    if port_name == EMULATED_PORT {
        let mut psu: MansonPsu<EmulatedSerial> = MansonPsu::default();
        psu.open(EmulatedSerial::new(Catalog::standard(), "SSP-9081"))
            .expect("Failed to connect to the emulated PSU");
        run(&mut psu).unwrap();
        return;
    }

    // Open serial port
    let port = serialport::new(&port_name, BAUD_RATE)
        .timeout(std::time::Duration::from_millis(SERIAL_TIMEOUT_MS))
        .open()
        .expect("Failed to open serial port");

    let mut psu: MansonPsu<PortWrapper> = MansonPsu::default();
    psu.open(PortWrapper(port)).expect("Failed to connect to the PSU");
    run(&mut psu).unwrap();
}
