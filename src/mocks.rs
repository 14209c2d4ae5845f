use crate::can::{CanController, CanError};
use crate::demo::InterruptLine;
use crate::frame::CanFrame;
use crate::status::{InterruptFlags, Status};
use alloc::vec::Vec;
use core::cell::RefCell;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiBus};
use embedded_time::clock::Error;
use embedded_time::duration::Duration;
use embedded_time::fixed_point::FixedPoint;
use embedded_time::fraction::Fraction;
use embedded_time::timer::param::{Armed, OneShot};
use embedded_hal_bus::spi::{DeviceError, ExclusiveDevice, NoDelay};
use embedded_time::{Clock, Instant, Timer};
use mockall::mock;

#[derive(Debug, PartialEq, Eq)]
pub struct TestClock {
    pub next_instants: RefCell<Vec<u64>>,
}

impl TestClock {
    pub fn new(next_instants: Vec<u64>) -> Self {
        Self {
            next_instants: RefCell::new(next_instants),
        }
    }
}

impl Clock for TestClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, Error> {
        if self.next_instants.borrow().len() == 0 {
            return Err(Error::Unspecified);
        }

        Ok(Instant::new(self.next_instants.borrow_mut().remove(0)))
    }

    fn new_timer<Dur>(&self, duration: Dur) -> Timer<OneShot, Armed, Self, Dur>
    where
        Dur: Duration + FixedPoint,
    {
        Timer::new(self, duration)
    }
}

/// SPI error carrying a code for assertions
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BusFault(pub u32);

impl spi::Error for BusFault {
    fn kind(&self) -> spi::ErrorKind {
        spi::ErrorKind::Other
    }
}

/// Pin error carrying a code for assertions
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PinFault(pub u32);

impl digital::Error for PinFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// Error of [TestDevice], bus faults and CS faults are reported separately
pub type TestDeviceError = DeviceError<BusFault, PinFault>;

pub type TestCanError = CanError<TestDeviceError>;

/// SPI device framing every transaction with the mocked CS pin
pub type TestDevice = ExclusiveDevice<MockSPIBus, MockPin, NoDelay>;

mock! {
    pub SPIBus {}

    impl spi::ErrorType for SPIBus {
        type Error = BusFault;
    }

    impl SpiBus<u8> for SPIBus {
        fn read(&mut self, words: &mut [u8]) -> Result<(), BusFault>;
        fn write(&mut self, words: &[u8]) -> Result<(), BusFault>;
        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusFault>;
        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), BusFault>;
        fn flush(&mut self) -> Result<(), BusFault>;
    }
}

mock! {
    pub Pin {}

    impl digital::ErrorType for Pin {
        type Error = PinFault;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), PinFault>;
        fn set_high(&mut self) -> Result<(), PinFault>;
    }
}

mock! {
    pub Controller {}

    impl CanController for Controller {
        type Error = TestCanError;

        fn transmit(&mut self, frame: &CanFrame) -> Result<(), TestCanError>;
        fn receive(&mut self) -> Result<CanFrame, TestCanError>;
        fn check_receive(&mut self) -> Result<bool, TestCanError>;
        fn read_status(&mut self) -> Result<Status, TestCanError>;
        fn read_interrupts(&mut self) -> Result<InterruptFlags, TestCanError>;
        fn clear_interrupts(&mut self) -> Result<(), TestCanError>;
    }
}

mock! {
    pub Line {}

    impl InterruptLine for Line {
        fn set_enabled(&mut self, enabled: bool);
    }
}
