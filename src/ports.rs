use anyhow::Result;
use serialport::SerialPortType;

/// Print the serial ports a device could be attached to.
pub fn list() -> Result<()> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    println!("Available serial ports:");
    for p in ports {
        match p.port_type {
            SerialPortType::UsbPort(info) => {
                let product = info.product.unwrap_or_default();
                println!(
                    "  {} (USB {:04x}:{:04x}) {}",
                    p.port_name, info.vid, info.pid, product
                );
            }
            SerialPortType::PciPort => println!("  {} (PCI)", p.port_name),
            SerialPortType::BluetoothPort => println!("  {} (Bluetooth)", p.port_name),
            SerialPortType::Unknown => println!("  {}", p.port_name),
        }
    }
    Ok(())
}
