// SPDX-License-Identifier: MIT
// Copyright 2025. Triad National Security, LLC.

#[cfg(test)]
mod tests {
    use kafleet_lib::template::{self, Template};

    const MASTER: &str = "\
global_defs {
    router_id $slb_hostname
}
vrrp_instance VI_1 {
    interface eth0
    $master_backup node1 node2
    virtual_router_id 51
}
";

    fn nodeset() -> Vec<String> {
        ["node1", "node2", "node3"]
            .iter()
            .map(|n| n.to_string())
            .collect()
    }

    #[test]
    fn priorities_follow_roles() {
        let tpl = Template::parse(MASTER);
        assert!(tpl.expand("node1").contains("    priority 150\n"));
        assert!(tpl.expand("node2").contains("    priority 100\n"));
        assert!(tpl.expand("node3").contains("    priority 50\n"));
        assert!(tpl.expand("lb99").contains("    priority 50\n"));
    }

    #[test]
    fn expand_for_node3() {
        let out = template::expand(MASTER, "node3", &nodeset());
        assert_eq!(
            out,
            "\
global_defs {
    router_id node3
}
vrrp_instance VI_1 {
    interface eth0
    priority 50
    virtual_router_id 51
}
"
        );
        assert!(!out.contains("$master_backup"));
        assert!(!out.contains('$'));
    }

    #[test]
    fn expansion_is_deterministic() {
        let first = template::expand(MASTER, "node2", &nodeset());
        let second = template::expand(MASTER, "node2", &nodeset());
        assert_eq!(first, second);
    }

    #[test]
    fn no_directives_is_byte_identical() {
        let text = "vrrp_script chk {\r\n  script \"/bin/true\"\r\n}\n\n# trailing, no newline";
        for node in nodeset() {
            assert_eq!(template::expand(text, &node, &nodeset()), text);
        }
    }

    #[test]
    fn malformed_directives_are_stripped() {
        let text = "\
a
    $master_backup node1
$master_backup node1 node2 node3
$master_backupnode1 node2
$unknown_directive foo
   $also_unknown
b
";
        let tpl = Template::parse(text);
        assert_eq!(tpl.unresolved_lines(), 5);
        assert_eq!(tpl.expand("node1"), "a\nb\n");
    }

    #[test]
    fn hostname_line_leading_the_line_is_kept() {
        let out = template::expand("$slb_hostname is here\n", "node1", &nodeset());
        assert_eq!(out, "node1 is here\n");
    }

    #[test]
    fn referenced_nodes_in_order() {
        let text = "$master_backup lb1 lb2\n$master_backup lb3 lb1\n";
        assert_eq!(
            Template::parse(text).referenced_nodes(),
            vec!["lb1", "lb2", "lb3", "lb1"]
        );
    }

    #[test]
    fn priority_for_resolves_tiers() {
        assert_eq!(template::priority_for("a", "a", "b"), template::PRIMARY_PRIORITY);
        assert_eq!(template::priority_for("b", "a", "b"), template::SECONDARY_PRIORITY);
        assert_eq!(template::priority_for("c", "a", "b"), template::OTHER_PRIORITY);
    }

    #[test]
    fn empty_template() {
        assert_eq!(template::expand("", "node1", &nodeset()), "");
    }

    #[test]
    fn unknown_nodes_are_reported() {
        let tpl = Template::parse("$master_backup node1 lb9\n$master_backup node2 node3\n");
        assert_eq!(tpl.unknown_nodes(&nodeset()), vec!["lb9"]);
        assert!(Template::parse(MASTER).unknown_nodes(&nodeset()).is_empty());
    }
}
