//! In-place numeric scanners
//!
//! Both scanners consume bytes from the window while decrementing the
//! caller's byte budget, and stop on the first byte that cannot extend the
//! value without consuming it, so the row grammar can dispatch on the
//! terminator. The real-number scanner is a hand-rolled state machine: it
//! needs no lookahead, no allocation, and terminates on any delimiter.
//!
//! Values are accumulated in `f64` and converted to the element type once
//! at emit; precision therefore matches a `coefficient * 10^exponent`
//! computation, not a max-precision decimal parser.

use crate::diag::Diagnostics;
use crate::error::Result;
use crate::io::is_delimiter;
use crate::io::window::FileWindow;
use crate::types::Element;

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Sign,
    IntegralPart,
    Period,
    FractionalPart,
    TheLetterE,
    ExponentSign,
    Exponent,
}

fn is_sign(c: u8) -> bool {
    c == b'-' || c == b'+'
}

fn is_exponent(c: u8) -> bool {
    c == b'e' || c == b'E'
}

fn signed(number: f64, negative: bool) -> f64 {
    if negative {
        -number
    } else {
        number
    }
}

/// Scan an unsigned integer.
///
/// Returns `Ok(Some(value))` when at least one digit was consumed and the
/// scan stopped on a recognised delimiter (left unconsumed). Returns
/// `Ok(None)` on a malformed value, on overflow, or when the budget ran out
/// mid-number; the position is left at the offending byte.
pub(crate) fn read_u64(
    window: &mut FileWindow,
    bytes_to_read: &mut usize,
    diag: &mut Diagnostics,
) -> Result<Option<u64>> {
    let mut value: u64 = 0;
    let mut found = false;

    while *bytes_to_read > 0 && window.can_read()? {
        let c = window.peek();

        if !c.is_ascii_digit() {
            if is_delimiter(c) {
                return Ok(if found { Some(value) } else { None });
            }
            diag.warn_at(window.file_offset(), || {
                format!("Unexpected character ('{}') in a uint64 value", c as char)
            });
            return Ok(None);
        }

        value = match value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(c - b'0')))
        {
            Some(v) => v,
            None => {
                diag.warn_at(window.file_offset(), || {
                    "Overflow while reading a uint64 value".to_string()
                });
                return Ok(None);
            }
        };
        found = true;

        window.advance();
        *bytes_to_read -= 1;
    }

    diag.warn_at(window.file_offset(), || {
        "Exhausted all input while reading a uint64 value".to_string()
    });
    Ok(None)
}

/// Scan a real number: optional sign, digits, optional fraction, optional
/// exponent.
///
/// Any byte that cannot extend the number terminates it and is left
/// unconsumed. When the byte budget (or the file) ends while the machine is
/// in an accepting state, the accumulated value is emitted, so the trailing
/// row of a file without a final newline still yields its parsed values.
/// A malformed prefix (e.g. a sign not followed by a digit) warns and
/// returns `Ok(None)`.
pub(crate) fn read_real<T: Element>(
    window: &mut FileWindow,
    bytes_to_read: &mut usize,
    diag: &mut Diagnostics,
) -> Result<Option<T>> {
    let mut state = State::Init;
    let mut coefficient = 0.0f64;
    let mut number = 0.0f64;
    let mut divider = 0.0f64;
    let mut negative = false;

    while *bytes_to_read > 0 && window.can_read()? {
        let c = window.peek();

        match state {
            State::Init => {
                // the number must start with a digit or a sign
                if c.is_ascii_digit() {
                    state = State::IntegralPart;
                    number = f64::from(c - b'0');
                } else if is_sign(c) {
                    state = State::Sign;
                    negative = c == b'-';
                } else {
                    diag.warn_at(window.file_offset(), || {
                        format!(
                            "Unexpected character ('{}') in a floating point value",
                            c as char
                        )
                    });
                    return Ok(None);
                }
            }
            State::Sign => {
                // the sign must be followed by a digit
                if c.is_ascii_digit() {
                    state = State::IntegralPart;
                    number = f64::from(c - b'0');
                } else {
                    diag.warn_at(window.file_offset(), || {
                        format!(
                            "A sign symbol is followed by an invalid character ('{}') \
                             in a floating point value",
                            c as char
                        )
                    });
                    return Ok(None);
                }
            }
            State::IntegralPart => {
                if c.is_ascii_digit() {
                    number = number * 10.0 + f64::from(c - b'0');
                } else if c == b'.' {
                    state = State::Period;
                } else if is_exponent(c) {
                    state = State::TheLetterE;
                    coefficient = signed(number, negative);
                    number = 0.0;
                } else {
                    return Ok(Some(T::from_f64(signed(number, negative))));
                }
            }
            State::Period => {
                if c.is_ascii_digit() {
                    state = State::FractionalPart;
                    coefficient = number;
                    number = f64::from(c - b'0');
                    divider = 10.0;
                } else {
                    // a bare trailing period emits the integral part
                    return Ok(Some(T::from_f64(signed(number, negative))));
                }
            }
            State::FractionalPart => {
                if c.is_ascii_digit() {
                    number = number * 10.0 + f64::from(c - b'0');
                    divider *= 10.0;
                } else if is_exponent(c) {
                    state = State::TheLetterE;
                    coefficient += number / divider;
                    if negative {
                        coefficient = -coefficient;
                    }
                } else {
                    coefficient += number / divider;
                    return Ok(Some(T::from_f64(signed(coefficient, negative))));
                }
            }
            State::TheLetterE => {
                // optional sign, then a nonempty run of digits
                if c.is_ascii_digit() {
                    state = State::Exponent;
                    negative = false;
                    number = f64::from(c - b'0');
                } else if is_sign(c) {
                    state = State::ExponentSign;
                    negative = c == b'-';
                } else {
                    diag.warn_at(window.file_offset(), || {
                        format!(
                            "An exponent symbol is followed by an invalid character ('{}') \
                             in a floating point value",
                            c as char
                        )
                    });
                    return Ok(None);
                }
            }
            State::ExponentSign => {
                if c.is_ascii_digit() {
                    state = State::Exponent;
                    number = f64::from(c - b'0');
                } else {
                    diag.warn_at(window.file_offset(), || {
                        format!(
                            "An exponent sign symbol is followed by an invalid character \
                             ('{}') in a floating point value",
                            c as char
                        )
                    });
                    return Ok(None);
                }
            }
            State::Exponent => {
                if c.is_ascii_digit() {
                    number = number * 10.0 + f64::from(c - b'0');
                } else {
                    let exponent = signed(number, negative);
                    return Ok(Some(T::from_f64(coefficient * 10.0f64.powf(exponent))));
                }
            }
        }

        window.advance();
        *bytes_to_read -= 1;
    }

    // input ended mid-number: emit from accepting states, fail from the rest
    match state {
        State::IntegralPart | State::Period => Ok(Some(T::from_f64(signed(number, negative)))),
        State::FractionalPart => {
            coefficient += number / divider;
            Ok(Some(T::from_f64(signed(coefficient, negative))))
        }
        State::Exponent => {
            let exponent = signed(number, negative);
            Ok(Some(T::from_f64(coefficient * 10.0f64.powf(exponent))))
        }
        State::Init | State::Sign | State::TheLetterE | State::ExponentSign => {
            diag.warn_at(window.file_offset(), || {
                "Exhausted all input while reading a floating point value".to_string()
            });
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TraceLevel;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn window_over(data: &[u8]) -> (FileWindow, NamedTempFile) {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(data).unwrap();
        tmp.flush().unwrap();
        let mut window = FileWindow::open(tmp.path()).unwrap();
        window.seek(0).unwrap();
        (window, tmp)
    }

    fn diag() -> Diagnostics {
        Diagnostics::new("scan-test".to_string(), TraceLevel::Error, 0)
    }

    fn scan_u64(data: &[u8]) -> (Option<u64>, usize) {
        let (mut window, _tmp) = window_over(data);
        let mut budget = data.len();
        let value = read_u64(&mut window, &mut budget, &mut diag()).unwrap();
        (value, budget)
    }

    fn scan_f64(data: &[u8]) -> Option<f64> {
        let (mut window, _tmp) = window_over(data);
        let mut budget = data.len();
        read_real::<f64>(&mut window, &mut budget, &mut diag()).unwrap()
    }

    #[test]
    fn u64_stops_on_delimiter() {
        let (value, budget) = scan_u64(b"1234|");
        assert_eq!(value, Some(1234));
        // the terminator is left unconsumed
        assert_eq!(budget, 1);
    }

    #[test]
    fn u64_accepts_all_delimiters() {
        for t in [b' ', b'\t', b'|', b':', b'\n', b'\r'] {
            let data = [b'4', b'2', t];
            let (value, _) = scan_u64(&data);
            assert_eq!(value, Some(42), "terminator {:?}", t as char);
        }
    }

    #[test]
    fn u64_rejects_garbage_terminator() {
        let (value, _) = scan_u64(b"12x ");
        assert_eq!(value, None);
    }

    #[test]
    fn u64_requires_at_least_one_digit() {
        let (value, _) = scan_u64(b" 1");
        assert_eq!(value, None);
    }

    #[test]
    fn u64_overflow_is_rejected() {
        let (value, _) = scan_u64(b"99999999999999999999:");
        assert_eq!(value, None);
    }

    #[test]
    fn u64_max_is_accepted() {
        let (value, _) = scan_u64(b"18446744073709551615 ");
        assert_eq!(value, Some(u64::MAX));
    }

    #[test]
    fn real_integer_forms() {
        assert_eq!(scan_f64(b"5 "), Some(5.0));
        assert_eq!(scan_f64(b"-17 "), Some(-17.0));
        assert_eq!(scan_f64(b"+3 "), Some(3.0));
    }

    #[test]
    fn real_fractions() {
        assert_eq!(scan_f64(b"2.5 "), Some(2.5));
        assert_eq!(scan_f64(b"-0.125 "), Some(-0.125));
    }

    #[test]
    fn real_exponents() {
        assert_eq!(scan_f64(b"1e3 "), Some(1000.0));
        assert_eq!(scan_f64(b"2.5e-2 "), Some(0.025));
        assert_eq!(scan_f64(b"-1.5E+2 "), Some(-150.0));
    }

    #[test]
    fn real_trailing_period_emits_integral_part() {
        assert_eq!(scan_f64(b"5. "), Some(5.0));
    }

    #[test]
    fn real_period_before_exponent_is_cut_short() {
        // "5.e3": the machine emits 5 at the 'e' and leaves it unconsumed
        let (mut window, _tmp) = window_over(b"5.e3 ");
        let mut budget = 5;
        let value = read_real::<f64>(&mut window, &mut budget, &mut diag()).unwrap();
        assert_eq!(value, Some(5.0));
        assert_eq!(window.peek(), b'e');
    }

    #[test]
    fn real_sign_without_digit_fails() {
        assert_eq!(scan_f64(b"- "), None);
        assert_eq!(scan_f64(b"+x "), None);
    }

    #[test]
    fn real_bare_exponent_fails() {
        assert_eq!(scan_f64(b"1e| "), None);
        assert_eq!(scan_f64(b"1e- "), None);
    }

    #[test]
    fn real_emits_at_end_of_budget() {
        // no trailing delimiter at all: accepting states still emit
        assert_eq!(scan_f64(b"42"), Some(42.0));
        assert_eq!(scan_f64(b"4.25"), Some(4.25));
        assert_eq!(scan_f64(b"1e2"), Some(100.0));
    }

    #[test]
    fn real_non_accepting_end_of_budget_fails() {
        assert_eq!(scan_f64(b"-"), None);
        assert_eq!(scan_f64(b"1e"), None);
        assert_eq!(scan_f64(b"1e-"), None);
    }

    #[test]
    fn real_f32_conversion_happens_at_emit() {
        let (mut window, _tmp) = window_over(b"0.1 ");
        let mut budget = 4;
        let value = read_real::<f32>(&mut window, &mut budget, &mut diag()).unwrap();
        assert_eq!(value, Some(0.1f64 as f32));
    }

    use proptest::prelude::*;

    proptest! {
        /// Parsed values track the standard parser to within a few ulps of
        /// the pow-based accumulation.
        #[test]
        fn real_matches_std_parse(value in -1.0e12f64..1.0e12f64) {
            let text = format!("{value} ");
            let parsed = scan_f64(text.as_bytes()).unwrap();
            let reference: f64 = text.trim().parse().unwrap();
            let tolerance = reference.abs() * 1e-12 + 1e-24;
            prop_assert!(
                (parsed - reference).abs() <= tolerance,
                "parsed {parsed}, reference {reference}"
            );
        }

        /// Integer round-trips are exact.
        #[test]
        fn u64_round_trips(value in 0u64..u64::MAX) {
            let text = format!("{value}|");
            let (parsed, _) = scan_u64(text.as_bytes());
            prop_assert_eq!(parsed, Some(value));
        }
    }
}
