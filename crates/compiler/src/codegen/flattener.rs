//! Control-Flow Flattener (C7, spec §4.7): wraps a method's state
//! fragments either in an affine-obfuscated `switch(state)` dispatch loop,
//! or — when flattening is disabled — serializes them as a linear
//! label-and-goto layout. Both must be behaviour-equivalent; the choice is
//! a build-time setting only.

use std::fmt::Write as _;

use super::StateFragment;

/// `visible = (raw XOR a) + b (mod 2^32)` (spec §4.7, §9: the formula is
/// fixed as the authoritative reading of an otherwise ambiguous transform).
fn obfuscate(raw: i32, a: u32, b: u32) -> i32 {
    (((raw as u32) ^ a).wrapping_add(b)) as i32
}

fn deobfuscate(visible: i32, a: u32, b: u32) -> i32 {
    (((visible as u32).wrapping_sub(b)) ^ a) as i32
}

/// Emit the flattened dispatch loop: a `switch` over the (possibly
/// obfuscated) state variable, one `case` per fragment, with a `default`
/// that terminates the method (spec §4.6 step 5: the sentinel is reached
/// only on a defect).
pub fn emit_flattened(
    fragments: &[StateFragment],
    entry_state: i32,
    sentinel_state: i32,
    obfuscation: Option<(u32, u32)>,
) -> String {
    let mut out = String::new();
    let (a, b) = obfuscation.unwrap_or((0, 0));
    let visible_entry = obfuscate(entry_state, a, b);

    let _ = writeln!(out, "  int32_t state = {};", visible_entry);
    let _ = writeln!(out, "  while (1) {{");
    let _ = writeln!(out, "  switch (state) {{");
    for frag in fragments {
        let visible = obfuscate(frag.state_id, a, b);
        let _ = writeln!(out, "  case {}: {{", visible);
        // Fragment bodies reference raw state ids in their own `state =
        // N;` assignments (emitted by C6/C8 against the label pool's raw
        // ids); re-obfuscate every such literal transition target so the
        // dispatch stays self-consistent under the affine transform.
        let rewritten = rewrite_state_literals(&frag.body, a, b);
        let _ = writeln!(out, "{}", rewritten);
        let _ = writeln!(out, "  }}");
    }
    let visible_sentinel = obfuscate(sentinel_state, a, b);
    let _ = writeln!(
        out,
        "  default: state = {}; continue;",
        visible_sentinel
    );
    let _ = writeln!(out, "  }}");
    let _ = writeln!(out, "  }}");
    out
}

/// Every `state = <int>;` literal in a fragment body names a *raw* state
/// id; under flattening the dispatch loop only ever holds *visible*
/// (obfuscated) ids, so those literals must be rewritten in lockstep.
fn rewrite_state_literals(body: &str, a: u32, b: u32) -> String {
    let mut out = String::with_capacity(body.len());
    let marker = "state = ";
    let mut rest = body;
    while let Some(pos) = rest.find(marker) {
        out.push_str(&rest[..pos + marker.len()]);
        rest = &rest[pos + marker.len()..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '-'))
            .unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(end);
        if let Ok(raw) = digits.parse::<i32>() {
            let _ = write!(out, "{}", obfuscate(raw, a, b));
        } else {
            out.push_str(digits);
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

/// State ids are arbitrary `i32`s drawn from [`nv_core::rng::SplitMix64`]
/// and routinely negative; a bare `{}` would render a `-` into a native
/// label/goto target, which is not a legal identifier character. Reinterpret
/// the id's bits as `u32` instead — a bijection, so distinct ids never
/// collide — giving an all-digit suffix safe to append after `state_`.
fn state_ident(id: i32) -> u32 {
    id as u32
}

/// Linear layout used when flattening is disabled: one native label per
/// state, fragments emitted in original order, `state = N; continue;`
/// transitions replaced by plain `goto`.
pub fn emit_linear(fragments: &[StateFragment], entry_state: i32) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "  goto state_{};", state_ident(entry_state));
    for frag in fragments {
        let _ = writeln!(out, "state_{}: {{", state_ident(frag.state_id));
        let body = rewrite_state_gotos(&frag.body);
        let _ = writeln!(out, "{}", body);
        let _ = writeln!(out, "}}");
    }
    out
}

/// Rewrite every `state = <int>; continue;` transition a fragment body
/// carries into `goto state_<ident>;`, where `<ident>` is the same
/// bit-reinterpreted non-negative suffix [`emit_linear`]'s labels use — a
/// naive textual `state = ` -> `goto state_` substitution would leave a
/// `-` in front of a negative id's digits, producing an illegal `goto
/// state_-123;` target.
fn rewrite_state_gotos(body: &str) -> String {
    let marker = "state = ";
    let mut out = String::with_capacity(body.len());
    let mut rest = body;
    while let Some(pos) = rest.find(marker) {
        out.push_str(&rest[..pos]);
        rest = &rest[pos + marker.len()..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '-'))
            .unwrap_or(rest.len());
        let (digits, tail) = rest.split_at(end);
        rest = tail;
        if let Ok(raw) = digits.parse::<i32>() {
            let _ = write!(out, "goto state_{};", state_ident(raw));
            if let Some(stripped) = rest.strip_prefix("; continue;") {
                rest = stripped;
            } else if let Some(stripped) = rest.strip_prefix(';') {
                rest = stripped;
            }
        } else {
            out.push_str(marker);
            out.push_str(digits);
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affine_transform_round_trips() {
        let raw = 42;
        let (a, b) = (0xABCD, 17);
        let visible = obfuscate(raw, a, b);
        assert_eq!(deobfuscate(visible, a, b), raw);
    }

    #[test]
    fn flattened_output_contains_obfuscated_entry_state() {
        let fragments = vec![StateFragment {
            state_id: 1,
            body: "  state = 2; continue;".to_string(),
        }];
        let out = emit_flattened(&fragments, 1, 99, Some((5, 9)));
        let expected_entry = obfuscate(1, 5, 9);
        assert!(out.contains(&format!("int32_t state = {};", expected_entry)));
    }

    #[test]
    fn linear_layout_uses_goto_instead_of_switch() {
        let fragments = vec![StateFragment {
            state_id: 1,
            body: "  state = 2; continue;".to_string(),
        }];
        let out = emit_linear(&fragments, 1);
        assert!(out.contains("goto state_2"));
        assert!(!out.contains("switch"));
    }

    #[test]
    fn linear_layout_renders_negative_state_ids_as_legal_identifiers() {
        let target = -1_735_288_191i32;
        let fragments = vec![
            StateFragment {
                state_id: 1,
                body: format!("  state = {}; continue;", target),
            },
            StateFragment {
                state_id: target,
                body: "  return 0;".to_string(),
            },
        ];
        let out = emit_linear(&fragments, 1);
        assert!(!out.contains('-'), "no '-' may appear in a label/goto target:\n{}", out);
        let ident = state_ident(target);
        assert!(out.contains(&format!("goto state_{};", ident)));
        assert!(out.contains(&format!("state_{}: {{", ident)));
    }

    #[test]
    fn unobfuscated_mode_is_identity() {
        let fragments = vec![StateFragment {
            state_id: 7,
            body: "  state = 8; continue;".to_string(),
        }];
        let out = emit_flattened(&fragments, 7, 9, None);
        assert!(out.contains("case 7:"));
        assert!(out.contains("state = 8"));
    }
}
