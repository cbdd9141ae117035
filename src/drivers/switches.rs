use embedded_hal::digital::v2::InputPin;

/// Card-detect switch and front panel button, both active low.
pub struct Switches<CD, BT> {
    card_detect: CD,
    button: BT,
}

impl<CD, BT> Switches<CD, BT>
where
    CD: InputPin,
    BT: InputPin,
{
    pub fn new(card_detect: CD, button: BT) -> Self {
        Self {
            card_detect,
            button,
        }
    }

    /// A card sits in the socket.
    pub fn card_present(&self) -> bool {
        self.card_detect.is_low().unwrap_or(false)
    }

    /// The action button is pressed.
    pub fn button_held(&self) -> bool {
        self.button.is_low().unwrap_or(false)
    }

    pub fn release(self) -> (CD, BT) {
        (self.card_detect, self.button)
    }
}
