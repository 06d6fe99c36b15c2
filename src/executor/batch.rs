//! Serial host batching for rolling execution.
//!
//! A play's serial specification partitions its resolved host list into
//! ordered batches that execute one after another. Entries are host counts
//! or percentages of the full list; the last entry repeats until every
//! host is covered.

use crate::error::{Error, Result};
use crate::playbook::SerialEntry;

fn entry_size(entry: &SerialEntry, total: usize) -> Result<usize> {
    match entry {
        SerialEntry::Count(n) => Ok(*n),
        SerialEntry::Percent(s) => {
            let trimmed = s.trim();
            if let Some(pct_str) = trimmed.strip_suffix('%') {
                let pct: f64 = pct_str
                    .trim()
                    .parse()
                    .map_err(|_| Error::Serial(s.clone()))?;
                if !(0.0..=100.0).contains(&pct) {
                    return Err(Error::Serial(s.clone()));
                }
                Ok(((total as f64) * pct / 100.0).floor() as usize)
            } else {
                trimmed.parse().map_err(|_| Error::Serial(s.clone()))
            }
        }
    }
}

/// Partition hosts into ordered serial batches.
///
/// Concatenating the batches reproduces the input order. An empty serial
/// spec yields a single batch of all hosts. Percentages are taken of the
/// full host count and rounded down; an entry resolving to zero hosts is
/// an error.
pub fn group_hosts_by_serial(
    hosts: &[String],
    serial: &[SerialEntry],
) -> Result<Vec<Vec<String>>> {
    if hosts.is_empty() {
        return Err(Error::EmptyHosts);
    }
    if serial.is_empty() {
        return Ok(vec![hosts.to_vec()]);
    }

    let mut batches = Vec::new();
    let mut offset = 0;
    let mut index = 0;
    while offset < hosts.len() {
        // the last entry repeats to cover the remainder
        let entry = &serial[index.min(serial.len() - 1)];
        let size = entry_size(entry, hosts.len())?;
        if size == 0 {
            return Err(Error::EmptyHosts);
        }
        let end = (offset + size).min(hosts.len());
        batches.push(hosts[offset..end].to_vec());
        offset = end;
        index += 1;
    }
    Ok(batches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hosts(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("h{}", i)).collect()
    }

    #[test]
    fn no_serial_is_one_batch() {
        let batches = group_hosts_by_serial(&hosts(3), &[]).unwrap();
        assert_eq!(batches, vec![hosts(3)]);
    }

    #[test]
    fn counts_partition_in_order() {
        let batches = group_hosts_by_serial(
            &hosts(6),
            &[SerialEntry::Count(2), SerialEntry::Count(4)],
        )
        .unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0], vec!["h1", "h2"]);
        assert_eq!(batches[1], vec!["h3", "h4", "h5", "h6"]);
    }

    #[test]
    fn last_entry_repeats() {
        let batches =
            group_hosts_by_serial(&hosts(7), &[SerialEntry::Count(1), SerialEntry::Count(2)])
                .unwrap();
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![1, 2, 2, 2]
        );
        let flat: Vec<_> = batches.into_iter().flatten().collect();
        assert_eq!(flat, hosts(7));
    }

    #[test]
    fn percentages_round_down() {
        let batches =
            group_hosts_by_serial(&hosts(10), &[SerialEntry::Percent("30%".into())]).unwrap();
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![3, 3, 3, 1]
        );
    }

    #[test]
    fn numeric_string_is_a_count() {
        let batches =
            group_hosts_by_serial(&hosts(4), &[SerialEntry::Percent("2".into())]).unwrap();
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn zero_sized_batch_errors() {
        assert!(matches!(
            group_hosts_by_serial(&hosts(4), &[SerialEntry::Count(0)]),
            Err(Error::EmptyHosts)
        ));
        // 5% of 4 hosts floors to zero
        assert!(matches!(
            group_hosts_by_serial(&hosts(4), &[SerialEntry::Percent("5%".into())]),
            Err(Error::EmptyHosts)
        ));
    }

    #[test]
    fn empty_hosts_error() {
        assert!(matches!(
            group_hosts_by_serial(&[], &[]),
            Err(Error::EmptyHosts)
        ));
    }

    #[test]
    fn invalid_entry_errors() {
        assert!(matches!(
            group_hosts_by_serial(&hosts(4), &[SerialEntry::Percent("lots".into())]),
            Err(Error::Serial(_))
        ));
    }
}
