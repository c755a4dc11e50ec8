// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use tokio::runtime::Runtime;

    use kafleet_lib::{
        fleet::{
            format_symmetric_buffers,
            sentinel::{parse_line_mode, parse_sentinel, with_sentinel},
            symmetric_buffers, CommandKind, Fleet, FleetCommand, NodeOutput, SentinelFleet,
        },
        test_env::*,
    };

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn nodes(v: &[&str]) -> Vec<String> {
        lines(v)
    }

    #[test]
    fn sentinel_is_appended() {
        assert_eq!(
            with_sentinel("systemctl reload keepalived"),
            "systemctl reload keepalived; echo \"Return Code=$?\""
        );
    }

    #[test]
    fn parse_sentinel_recovers_exit_code() {
        assert_eq!(
            parse_sentinel(&lines(&["output", "Return Code=0"])),
            (Some(0), lines(&["output"]))
        );
        assert_eq!(
            parse_sentinel(&lines(&["Return Code=127"])),
            (Some(127), Vec::new())
        );
        assert_eq!(
            parse_sentinel(&lines(&["output", "cut off"])),
            (None, lines(&["output", "cut off"]))
        );
        assert_eq!(parse_sentinel(&[]), (None, Vec::new()));
        assert_eq!(
            parse_sentinel(&lines(&["Return Code=abc"])),
            (None, lines(&["Return Code=abc"]))
        );
    }

    #[test]
    fn line_mode_groups_identical_output() {
        let stdout = "\
lb1: Return Code=0
lb2: Return Code=0
lb3: error: failed
lb3: Return Code=1
garbage without a node
";
        let buffers = parse_line_mode(stdout);
        assert_eq!(
            buffers,
            vec![
                (lines(&["Return Code=0"]), nodes(&["lb1", "lb2"])),
                (lines(&["error: failed", "Return Code=1"]), nodes(&["lb3"])),
            ]
        );
    }

    #[test]
    fn symmetric_buffer_display() {
        let outputs = vec![
            NodeOutput {
                node: "lb1".to_string(),
                exit_code: Some(1),
                lines: lines(&["boom"]),
            },
            NodeOutput {
                node: "lb2".to_string(),
                exit_code: Some(1),
                lines: lines(&["boom"]),
            },
        ];
        let buffers = symmetric_buffers(&outputs);
        assert_eq!(buffers, vec![(lines(&["boom"]), nodes(&["lb1", "lb2"]))]);
        assert_eq!(
            format_symmetric_buffers(&buffers),
            "---------------\nlb1,lb2\n---------------\nboom\n"
        );
    }

    #[test]
    fn sentinel_fleet_maps_exit_codes() {
        let fleet = SentinelFleet::new(
            FakeShell::new()
                .exit_code("lb2", 3)
                .truncate("lb3", "systemctl"),
        );
        let command = FleetCommand::new(CommandKind::Reload, "systemctl reload keepalived");

        let rt = Runtime::new().unwrap();
        let outputs = rt.block_on(fleet.run_on_cluster(&command, &nodes(&["lb1", "lb2", "lb3"])));

        let codes: Vec<Option<i32>> = outputs.iter().map(|o| o.exit_code).collect();
        assert_eq!(codes, vec![Some(0), Some(3), None]);
        assert_eq!(outputs[0].lines, lines(&["systemctl reload keepalived"]));

        // A shared command is sent once to every node.
        let calls = fleet.shell().calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, nodes(&["lb1", "lb2", "lb3"]));
    }

    #[test]
    fn sentinel_fleet_runs_node_specific_commands_per_node() {
        let fleet = SentinelFleet::new(FakeShell::new());
        let command = FleetCommand::new(CommandKind::Activate, "cp conf_{node} conf");

        let rt = Runtime::new().unwrap();
        let outputs = rt.block_on(fleet.run_on_cluster(&command, &nodes(&["lb1", "lb2"])));
        assert!(outputs.iter().all(|o| o.success()));

        let mut calls = fleet.shell().calls();
        calls.sort();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].0.starts_with("cp conf_lb1 conf;"));
        assert_eq!(calls[0].1, nodes(&["lb1"]));
        assert!(calls[1].0.starts_with("cp conf_lb2 conf;"));
    }

    #[test]
    fn silent_nodes_are_unreachable() {
        let fleet = SentinelFleet::new(FakeShell::new().silent("lb2"));

        let rt = Runtime::new().unwrap();
        let reachable = rt.block_on(fleet.reachable_nodes(&nodes(&["lb1", "lb2", "lb3"])));
        assert_eq!(reachable, nodes(&["lb1", "lb3"]));
    }
}
