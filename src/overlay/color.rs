use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const WHITE: Rgb = Rgb(255, 255, 255);
    pub const BLACK: Rgb = Rgb(0, 0, 0);

    /// Parses `RRGGBB` (optionally prefixed with `#`) or a basic color name.
    pub fn parse(value: &str) -> Option<Rgb> {
        let hex = value.strip_prefix('#').unwrap_or(value);
        if hex.len() == 6 && hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            let channel = |range: std::ops::Range<usize>| u8::from_str_radix(&hex[range], 16).ok();
            return Some(Rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?));
        }
        named_color(&value.to_ascii_lowercase())
    }

    pub fn parse_or(value: Option<&str>, default: Rgb) -> Rgb {
        value.and_then(Rgb::parse).unwrap_or(default)
    }

    pub fn to_hex(self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }

    pub(crate) fn hex_digits(self) -> String {
        format!("{:02X}{:02X}{:02X}", self.0, self.1, self.2)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn named_color(name: &str) -> Option<Rgb> {
    let rgb = match name {
        "white" => Rgb::WHITE,
        "black" => Rgb::BLACK,
        "red" => Rgb(255, 0, 0),
        "green" => Rgb(0, 128, 0),
        "lime" => Rgb(0, 255, 0),
        "blue" => Rgb(0, 0, 255),
        "yellow" => Rgb(255, 255, 0),
        "cyan" | "aqua" => Rgb(0, 255, 255),
        "magenta" | "fuchsia" => Rgb(255, 0, 255),
        "gray" | "grey" => Rgb(128, 128, 128),
        "silver" => Rgb(192, 192, 192),
        "orange" => Rgb(255, 165, 0),
        "purple" => Rgb(128, 0, 128),
        "pink" => Rgb(255, 192, 203),
        "brown" => Rgb(165, 42, 42),
        "navy" => Rgb(0, 0, 128),
        "gold" => Rgb(255, 215, 0),
        _ => return None,
    };
    Some(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_with_and_without_hash() {
        assert_eq!(Rgb::parse("#FF5722"), Some(Rgb(0xFF, 0x57, 0x22)));
        assert_eq!(Rgb::parse("ff5722"), Some(Rgb(0xFF, 0x57, 0x22)));
        assert_eq!(Rgb::parse("#00aAfF"), Some(Rgb(0x00, 0xAA, 0xFF)));
    }

    #[test]
    fn surrounding_whitespace_is_not_a_color() {
        assert_eq!(Rgb::parse(" #00aAfF "), None);
        assert_eq!(Rgb::parse_or(Some(" #00aAfF "), Rgb::WHITE), Rgb::WHITE);
        assert_eq!(Rgb::parse_or(Some("red "), Rgb::BLACK), Rgb::BLACK);
    }

    #[test]
    fn parses_named_colors() {
        assert_eq!(Rgb::parse("yellow"), Some(Rgb(255, 255, 0)));
        assert_eq!(Rgb::parse("Black"), Some(Rgb::BLACK));
    }

    #[test]
    fn invalid_values_fall_back_to_default() {
        for value in ["#FFF", "#GGGGGG", "12345", "#1234567", "", "not-a-color", "#ff57 2"] {
            assert_eq!(Rgb::parse_or(Some(value), Rgb::WHITE), Rgb::WHITE, "{value}");
        }
        assert_eq!(Rgb::parse_or(None, Rgb::BLACK), Rgb::BLACK);
    }

    #[test]
    fn hex_output_is_uppercase_with_hash() {
        assert_eq!(Rgb(255, 87, 34).to_hex(), "#FF5722");
        assert_eq!(Rgb(1, 2, 3).hex_digits(), "010203");
    }
}
