//! VCD (IEEE 1364 Value Change Dump) export of the recorded signal trace.

use std::io::Write;

use crate::kernel::TraceEvent;

/// Generates a VCD identifier code from a sequential index.
///
/// Uses printable ASCII characters starting from `!` (0x21).
fn make_id_code(index: usize) -> String {
    let mut result = String::new();
    let mut idx = index;
    loop {
        result.push((b'!' + (idx % 94) as u8) as char);
        idx /= 94;
        if idx == 0 {
            break;
        }
        idx -= 1;
    }
    result
}

fn format_value(value: u32, width: u32) -> String {
    if width == 1 {
        format!("{}", value & 1)
    } else {
        format!("b{:b} ", value)
    }
}

/// Writes `trace` as VCD. Signal names are `scope.port`; times are in fs.
pub fn write_vcd<W: Write>(
    mut w: W,
    scope: &str,
    signals: &[(String, u32)],
    trace: &[TraceEvent],
) -> std::io::Result<()> {
    writeln!(w, "$version rv32i-tb $end")?;
    writeln!(w, "$timescale 1fs $end")?;
    writeln!(w, "$scope module {} $end", scope)?;
    let mut codes = Vec::with_capacity(signals.len());
    for (i, (name, width)) in signals.iter().enumerate() {
        let code = make_id_code(i);
        let short = name.rsplit('.').next().unwrap_or(name);
        writeln!(w, "$var wire {} {} {} $end", width, code, short)?;
        codes.push((name.as_str(), *width, code));
    }
    writeln!(w, "$upscope $end")?;
    writeln!(w, "$enddefinitions $end")?;

    writeln!(w, "$dumpvars")?;
    for (_, width, code) in &codes {
        if *width == 1 {
            writeln!(w, "x{}", code)?;
        } else {
            writeln!(w, "bx {}", code)?;
        }
    }
    writeln!(w, "$end")?;

    let mut current = None;
    for ev in trace {
        let Some((_, width, code)) = codes.iter().find(|(n, _, _)| *n == ev.signal) else {
            continue;
        };
        if current != Some(ev.time_fs) {
            writeln!(w, "#{}", ev.time_fs)?;
            current = Some(ev.time_fs);
        }
        writeln!(w, "{}{}", format_value(ev.value, *width), code)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_codes() {
        assert_eq!(make_id_code(0), "!");
        assert_eq!(make_id_code(93), "~");
        assert_eq!(make_id_code(94), "!!");
    }

    #[test]
    fn dump_contains_changes_in_time_order() {
        let signals = vec![("top.CLK".to_string(), 1), ("top.BUS".to_string(), 4)];
        let trace = vec![
            TraceEvent {
                time_fs: 0,
                signal: "top.CLK".into(),
                value: 0,
            },
            TraceEvent {
                time_fs: 0,
                signal: "top.BUS".into(),
                value: 5,
            },
            TraceEvent {
                time_fs: 5_000_000,
                signal: "top.CLK".into(),
                value: 1,
            },
        ];
        let mut out = Vec::new();
        write_vcd(&mut out, "top", &signals, &trace).unwrap();
        let vcd = String::from_utf8(out).unwrap();
        assert!(vcd.contains("$var wire 1 ! CLK $end"));
        assert!(vcd.contains("$var wire 4 \" BUS $end"));
        let t0 = vcd.find("#0\n").unwrap();
        let t5 = vcd.find("#5000000\n").unwrap();
        assert!(t0 < t5);
        assert!(vcd.contains("0!\n"));
        assert!(vcd.contains("b101 \"\n"));
        assert!(vcd[t5..].contains("1!\n"));
    }
}
