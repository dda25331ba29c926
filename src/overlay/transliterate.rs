//! Approximate Thai to Latin romanization, used only when a request opts in.

const THANTHAKHAT: char = '\u{0E4C}';

fn consonant(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'ก' => "k",
        'ข' | 'ฃ' | 'ค' | 'ฅ' | 'ฆ' => "kh",
        'ง' => "ng",
        'จ' | 'ฉ' | 'ช' | 'ฌ' => "ch",
        'ซ' | 'ศ' | 'ษ' | 'ส' => "s",
        'ญ' | 'ย' => "y",
        'ฎ' | 'ด' => "d",
        'ฏ' | 'ต' => "t",
        'ฐ' | 'ฑ' | 'ฒ' | 'ถ' | 'ท' | 'ธ' => "th",
        'ณ' | 'น' => "n",
        'บ' => "b",
        'ป' => "p",
        'ผ' | 'พ' | 'ภ' => "ph",
        'ฝ' | 'ฟ' => "f",
        'ม' => "m",
        'ร' => "r",
        'ล' | 'ฬ' => "l",
        'ว' => "w",
        'ห' | 'ฮ' => "h",
        'อ' => "",
        'ฤ' => "rue",
        'ฦ' => "lue",
        _ => return None,
    };
    Some(latin)
}

fn vowel(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'ะ' | 'ั' | 'า' => "a",
        'ำ' => "am",
        'ิ' | 'ี' => "i",
        'ึ' | 'ื' => "ue",
        'ุ' | 'ู' => "u",
        _ => return None,
    };
    Some(latin)
}

/// Vowels written before the consonant they follow in speech.
fn leading_vowel(ch: char) -> Option<&'static str> {
    let latin = match ch {
        'เ' => "e",
        'แ' => "ae",
        'โ' => "o",
        'ใ' | 'ไ' => "ai",
        _ => return None,
    };
    Some(latin)
}

fn is_silent_mark(ch: char) -> bool {
    // tone marks, maitaikhu, lengthening sign, yamakkan
    matches!(ch, '\u{0E47}'..='\u{0E4B}' | '\u{0E45}' | '\u{0E4E}' | '\u{0E3A}')
}

pub fn transliterate_thai(text: &str) -> String {
    let mut pieces: Vec<String> = Vec::with_capacity(text.len());
    let mut pending: Option<&'static str> = None;
    let mut last_consonant: Option<usize> = None;

    for ch in text.chars() {
        if let Some(latin) = leading_vowel(ch) {
            if let Some(held) = pending.replace(latin) {
                pieces.push(held.to_string());
            }
            continue;
        }
        if let Some(latin) = consonant(ch) {
            last_consonant = Some(pieces.len());
            pieces.push(latin.to_string());
            if let Some(held) = pending.take() {
                pieces.push(held.to_string());
            }
            continue;
        }
        if let Some(held) = pending.take() {
            pieces.push(held.to_string());
        }
        if ch == THANTHAKHAT {
            if let Some(index) = last_consonant.take() {
                pieces[index].clear();
            }
            continue;
        }
        if let Some(latin) = vowel(ch) {
            pieces.push(latin.to_string());
            continue;
        }
        if is_silent_mark(ch) {
            continue;
        }
        match ch {
            '\u{0E50}'..='\u{0E59}' => {
                let digit = (ch as u32 - 0x0E50) as u8;
                pieces.push(char::from(b'0' + digit).to_string());
            }
            'ฯ' => pieces.push("...".to_string()),
            'ๆ' => {}
            _ => {
                last_consonant = None;
                pieces.push(ch.to_string());
            }
        }
    }
    if let Some(held) = pending {
        pieces.push(held.to_string());
    }
    pieces.concat()
}

pub fn contains_thai(text: &str) -> bool {
    text.chars().any(|ch| matches!(ch as u32, 0x0E00..=0x0E7F))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_words() {
        assert_eq!(transliterate_thai("สวัสดี"), "swasdi");
        assert_eq!(transliterate_thai("มา"), "ma");
    }

    #[test]
    fn leading_vowels_follow_their_consonant() {
        assert_eq!(transliterate_thai("เกม"), "kem");
        assert_eq!(transliterate_thai("ไป"), "pai");
    }

    #[test]
    fn thanthakhat_silences_previous_consonant() {
        assert_eq!(transliterate_thai("การ์ตูน"), "katun");
    }

    #[test]
    fn tone_marks_are_dropped_and_digits_converted() {
        assert_eq!(transliterate_thai("ไม่"), "mai");
        assert_eq!(transliterate_thai("๑๒๓"), "123");
    }

    #[test]
    fn non_thai_text_passes_through() {
        assert_eq!(transliterate_thai("Hello, World! 42"), "Hello, World! 42");
        assert_eq!(transliterate_thai("ทดสอบ API\nline"), "thdsb API\nline");
        assert!(!contains_thai("plain"));
        assert!(contains_thai("ภาษาไทย"));
    }
}
