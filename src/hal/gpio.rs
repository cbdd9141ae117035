use avr_device::atmega2560::{PORTB, PORTD, PORTG, PORTH};
use core::convert::Infallible;
use core::marker::PhantomData;
use embedded_hal::digital::v2::{InputPin, OutputPin, StatefulOutputPin, ToggleableOutputPin};

pub trait PinMode {}
/// State after reset: input, pull-up off
pub struct Floating;
/// Input with the internal pull-up enabled
pub struct PullUp;
pub struct Output;
impl PinMode for Floating {}
impl PinMode for PullUp {}
impl PinMode for Output {}

#[derive(Debug)]
pub struct Pin<PORT, const PIN: u8, MODE> {
    _port: PhantomData<PORT>,
    _mode: PhantomData<MODE>,
}

impl<PORT, const P: u8, MODE> Pin<PORT, P, MODE> {
    const MASK: u8 = 1 << P;

    fn retype<NEW>() -> Pin<PORT, P, NEW> {
        Pin {
            _port: PhantomData,
            _mode: PhantomData,
        }
    }
}

impl<PORT, const P: u8> Pin<PORT, P, Floating> {
    fn reset() -> Self {
        Self::retype()
    }
}

macro_rules! impl_port {
    ($PORT:ident, $ddr:ident, $port:ident, $pin:ident) => {
        impl<const P: u8, MODE: PinMode> Pin<$PORT, P, MODE> {
            pub fn into_output(self) -> Pin<$PORT, P, Output> {
                // Set DDRx bit
                unsafe {
                    (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(r.bits() | Self::MASK));
                }
                Self::retype()
            }

            pub fn into_pull_up_input(self) -> Pin<$PORT, P, PullUp> {
                // Clear DDRx bit, then enable the pull-up
                unsafe {
                    (*$PORT::ptr()).$ddr.modify(|r, w| w.bits(r.bits() & !Self::MASK));
                    (*$PORT::ptr()).$port.modify(|r, w| w.bits(r.bits() | Self::MASK));
                }
                Self::retype()
            }
        }

        impl<const P: u8> OutputPin for Pin<$PORT, P, Output> {
            type Error = Infallible;

            #[inline]
            fn set_high(&mut self) -> Result<(), Infallible> {
                unsafe {
                    (*$PORT::ptr()).$port.modify(|r, w| w.bits(r.bits() | Self::MASK));
                }
                Ok(())
            }

            #[inline]
            fn set_low(&mut self) -> Result<(), Infallible> {
                unsafe {
                    (*$PORT::ptr()).$port.modify(|r, w| w.bits(r.bits() & !Self::MASK));
                }
                Ok(())
            }
        }

        impl<const P: u8> StatefulOutputPin for Pin<$PORT, P, Output> {
            #[inline]
            fn is_set_high(&self) -> Result<bool, Infallible> {
                Ok(unsafe { (*$PORT::ptr()).$port.read().bits() } & Self::MASK != 0)
            }

            #[inline]
            fn is_set_low(&self) -> Result<bool, Infallible> {
                self.is_set_high().map(|high| !high)
            }
        }

        impl<const P: u8> ToggleableOutputPin for Pin<$PORT, P, Output> {
            type Error = Infallible;

            #[inline]
            fn toggle(&mut self) -> Result<(), Infallible> {
                // Writing one to PINx flips PORTx
                unsafe {
                    (*$PORT::ptr()).$pin.write(|w| w.bits(Self::MASK));
                }
                Ok(())
            }
        }

        impl<const P: u8> InputPin for Pin<$PORT, P, PullUp> {
            type Error = Infallible;

            #[inline]
            fn is_high(&self) -> Result<bool, Infallible> {
                Ok(unsafe { (*$PORT::ptr()).$pin.read().bits() } & Self::MASK != 0)
            }

            #[inline]
            fn is_low(&self) -> Result<bool, Infallible> {
                self.is_high().map(|high| !high)
            }
        }
    };
}

impl_port!(PORTB, ddrb, portb, pinb);
impl_port!(PORTD, ddrd, portd, pind);
impl_port!(PORTG, ddrg, portg, ping);
impl_port!(PORTH, ddrh, porth, pinh);

/// Ultimaker 2 main board
pub mod board {
    use super::*;

    pub type CardDetect = Pin<PORTG, 2, PullUp>;
    pub type Button = Pin<PORTD, 2, PullUp>;
    pub type StatusLed = Pin<PORTH, 5, Output>;

    pub type CardSelect = Pin<PORTB, 0, Output>;
    pub type Sck = Pin<PORTB, 1, Output>;
    pub type Mosi = Pin<PORTB, 2, Output>;
    pub type Miso = Pin<PORTB, 3, PullUp>;

    /// Pins used by the bootloader, configured.
    pub struct Pins {
        pub card_detect: CardDetect,
        pub button: Button,
        pub led: StatusLed,
        pub card_select: CardSelect,
        pub sck: Sck,
        pub mosi: Mosi,
        pub miso: Miso,
    }

    impl Pins {
        /// Takes the ports and sets up every pin the bootloader drives.
        pub fn new(_portb: PORTB, _portd: PORTD, _portg: PORTG, _porth: PORTH) -> Self {
            let mut card_select = Pin::<PORTB, 0, Floating>::reset().into_output();
            // deselect the card before the bus is clocked
            let _ = card_select.set_high();
            Self {
                card_detect: Pin::<PORTG, 2, Floating>::reset().into_pull_up_input(),
                button: Pin::<PORTD, 2, Floating>::reset().into_pull_up_input(),
                led: Pin::<PORTH, 5, Floating>::reset().into_output(),
                card_select,
                sck: Pin::<PORTB, 1, Floating>::reset().into_output(),
                mosi: Pin::<PORTB, 2, Floating>::reset().into_output(),
                miso: Pin::<PORTB, 3, Floating>::reset().into_pull_up_input(),
            }
        }
    }
}
