//! Help text blocks and the lookup rules that pick among them.

/// One block of help output, selected by a command-name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelpTopic {
    pub prefix: &'static str,
    /// Heading printed above the block in the full listing.
    pub title: Option<&'static str>,
    pub body: &'static str,
}

/// Read access to an ordered topic table.
pub trait HelpProvider {
    fn help_topics(&self) -> &[HelpTopic];

    /// Empty `arg` renders every block in order. Otherwise the first topic whose
    /// prefix starts `arg` is rendered alone; `None` when nothing matches.
    fn render_help(&self, arg: &str) -> Option<String> {
        let arg = arg.trim();
        let topics = self.help_topics();
        if arg.is_empty() {
            let mut out = String::new();
            for topic in topics {
                if let Some(title) = topic.title {
                    out.push_str(title);
                    out.push('\n');
                }
                out.push_str(topic.body);
            }
            return Some(out);
        }
        topics
            .iter()
            .find(|t| arg.starts_with(t.prefix))
            .map(|t| t.body.to_string())
    }
}

pub fn general() -> HelpTopic {
    HelpTopic {
        prefix: "help",
        title: None,
        body: "help [topic]\n\
               \x20 show this help; topics: s. c.\n\
               version\n\
               \x20 show firmware version\n",
    }
}

pub fn console() -> HelpTopic {
    HelpTopic {
        prefix: "c.",
        title: Some("CONSOLE"),
        body: "c.host [name]\n\
               \x20 show or set the host name\n\
               c.pass [password]\n\
               \x20 show whether a console password is set, or set a new one\n\
               c.stats\n\
               \x20 show console statistics\n",
    }
}

pub fn sensors() -> HelpTopic {
    HelpTopic {
        prefix: "s.",
        title: Some("SENSORS"),
        body: "s.scan\n\
               \x20 scan for sensors\n\
               s.info\n\
               \x20 display sensor configuration\n\
               s.trig\n\
               \x20 trigger sensor readout (even if interval is not expired)\n\
               s.set interval [seconds]\n\
               s.set ds address <idx> <address>\n\
               \x20         topic   <idx> [topic]\n\
               \x20         pin     [pin idx]\n\
               s.set dht pin [pin idx|off]\n\
               \x20         type [dht11|dht12|dht21|dht22|am2301]\n\
               \x20         ttopic [topic]\n\
               \x20         htopic [topic]\n\
               s.set bme base [topic]\n\
               \x20         temp [name]\n\
               \x20         pressure [name]\n\
               \x20         humidity [name]\n\
               \x20         gas-res [name]\n",
    }
}

/// Network sessions only.
pub fn quit() -> HelpTopic {
    HelpTopic {
        prefix: "quit",
        title: None,
        body: "quit\n\
               \x20 close this session\n",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Table(Vec<HelpTopic>);

    impl HelpProvider for Table {
        fn help_topics(&self) -> &[HelpTopic] {
            &self.0
        }
    }

    #[test]
    fn full_listing_keeps_order_and_titles() {
        let t = Table(vec![general(), console(), sensors()]);
        let out = t.render_help("").unwrap();
        let c = out.find("CONSOLE\nc.host").unwrap();
        let s = out.find("SENSORS\ns.scan").unwrap();
        assert!(out.starts_with("help [topic]\n"));
        assert!(c < s);
    }

    #[test]
    fn prefix_selects_single_block() {
        let t = Table(vec![general(), console(), sensors()]);
        let out = t.render_help("s.set").unwrap();
        assert!(out.starts_with("s.scan\n"));
        assert!(!out.contains("SENSORS"));
        assert!(!out.contains("c.host"));
        assert_eq!(t.render_help("x.y"), None);
    }
}
