//! COM1 logging. Every `log_*!` line goes out the first serial port, or to
//! stderr when running under the test harness.

#[cfg(all(target_arch = "x86", target_os = "none"))]
mod port {
    use lazy_static::lazy_static;
    use spin::Mutex;
    use x86::io::{inb, outb};

    // Register offsets from the port base.
    const DATA: u16 = 0;
    const INT_ENABLE: u16 = 1;
    const FIFO_CTRL: u16 = 2;
    const LINE_CTRL: u16 = 3;
    const MODEM_CTRL: u16 = 4;
    const LINE_STATUS: u16 = 5;

    const DLAB: u8 = 0x80;
    const EIGHT_N_ONE: u8 = 0x03;
    /// 115200 / 3 = 38400 baud.
    const DIVISOR: u8 = 0x03;
    const TX_EMPTY: u8 = 0x20;

    /// A 16550 UART driven by polling.
    pub struct SerialPort {
        base: u16,
    }

    impl SerialPort {
        /// # Safety
        /// `base` must be the I/O base of a 16550-compatible UART.
        pub const unsafe fn new(base: u16) -> SerialPort {
            SerialPort { base }
        }

        fn write_reg(&mut self, reg: u16, value: u8) {
            unsafe { outb(self.base + reg, value) }
        }

        fn read_reg(&mut self, reg: u16) -> u8 {
            unsafe { inb(self.base + reg) }
        }

        pub fn init(&mut self) {
            self.write_reg(INT_ENABLE, 0x00);
            self.write_reg(LINE_CTRL, DLAB);
            self.write_reg(DATA, DIVISOR);
            self.write_reg(INT_ENABLE, 0x00);
            self.write_reg(LINE_CTRL, EIGHT_N_ONE);
            self.write_reg(FIFO_CTRL, 0xC7);
            self.write_reg(MODEM_CTRL, 0x0B);
            self.write_reg(INT_ENABLE, 0x01);
        }

        pub fn send(&mut self, data: u8) {
            while self.read_reg(LINE_STATUS) & TX_EMPTY == 0 {
                core::hint::spin_loop();
            }
            self.write_reg(DATA, data);
        }
    }

    impl core::fmt::Write for SerialPort {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            s.bytes().for_each(|byte| self.send(byte));
            Ok(())
        }
    }

    lazy_static! {
        pub static ref SERIAL1: Mutex<SerialPort> = {
            let mut serial_port = unsafe { SerialPort::new(0x3F8) };
            serial_port.init();
            Mutex::new(serial_port)
        };
    }
}

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub use port::SERIAL1;

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    #[cfg(all(feature = "logging", target_arch = "x86", target_os = "none"))]
    {
        use core::fmt::Write;
        // `SerialPort::write_str` cannot fail, so only a formatting error
        // reaches here. The panic handler logs through this path and must
        // not panic again, so such a line is dropped.
        let _ = SERIAL1.lock().write_fmt(args);
    }
    #[cfg(all(feature = "logging", test))]
    {
        std::eprint!("{}", args);
    }
    #[cfg(not(any(
        all(feature = "logging", target_arch = "x86", target_os = "none"),
        all(feature = "logging", test)
    )))]
    {
        let _ = args;
    }
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        $crate::serial::_print(format_args!("[INFO] "));
        $crate::serial::_print(format_args!($($arg)*));
        $crate::serial::_print(format_args!("\n"));
    }};
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {{
        $crate::serial::_print(format_args!("[WARN] "));
        $crate::serial::_print(format_args!($($arg)*));
        $crate::serial::_print(format_args!("\n"));
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        $crate::serial::_print(format_args!("[ERROR] "));
        $crate::serial::_print(format_args!($($arg)*));
        $crate::serial::_print(format_args!("\n"));
    }};
}

pub fn init() {
    #[cfg(all(target_arch = "x86", target_os = "none"))]
    {
        let _ = SERIAL1.lock();
    }
}
