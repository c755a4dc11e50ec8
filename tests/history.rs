// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use kafleet_lib::{history::*, test_env::*};

    #[test]
    fn serde1() {
        let record = Record {
            timestamp: Utc::now().naive_utc(),
            event: Event::PushFailed,
            obj_id: "lb03".to_string(),
            comment: Some("hello".to_string()),
        };
        let output = record.as_string();

        let new_record = Record::from_string(&output).unwrap();

        assert_eq!(record, new_record);
    }

    #[test]
    fn comment_stays_on_one_line() {
        let record = Record::new(
            Event::ParseFailed,
            "lb01",
            Some("line 1\tbad\nline 2".to_string()),
        );
        let parsed = Record::from_string(&record.as_string()).unwrap();
        assert_eq!(parsed.comment.as_deref(), Some("line 1 bad line 2"));
    }

    #[test]
    fn malformed_records_are_rejected() {
        assert!(Record::from_string("not a record").is_err());
        assert!(Record::from_string("2024-01-01T00:00:00\tbogus\tlb01\t").is_err());
    }

    #[test]
    fn records_are_appended() {
        let env = TestEnvironment::new("history_append");
        let path = env.private_dir().join(HISTORY_FILE);

        let history = History::open(&path).unwrap();
        history
            .write_record(Record::new(Event::Commit, "keepalived.conf", None))
            .unwrap();
        drop(history);

        let history = History::open(&path).unwrap();
        history
            .write_record(Record::new(Event::Succeeded, "keepalived.conf", None))
            .unwrap();

        let events: Vec<Event> = history.records().unwrap().iter().map(|r| r.event).collect();
        assert_eq!(events, vec![Event::Commit, Event::Succeeded]);
    }
}
