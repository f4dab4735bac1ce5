//! Graphviz Rendering
//!
//! Renders an assembled [`Graph`] as a DOT digraph. Nested sub-workflows are
//! drawn as clusters up to `inline_depth` levels; deeper ones collapse to a
//! single node.

use std::fmt::Write;

use crate::compiler::dag::{Edge, Endpoint, Graph, Link, Node};

/// Display options for [`to_dot`].
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Label edges with the consuming port name
    pub label_edges: bool,
    /// Label step nodes with `id (tool)` instead of `id`
    pub label_stepname: bool,
    pub show_inputs: bool,
    pub show_outputs: bool,
    pub dark_theme: bool,
    /// Sub-workflows nested deeper than this are drawn as one node
    pub inline_depth: usize,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            label_edges: false,
            label_stepname: false,
            show_inputs: false,
            show_outputs: false,
            dark_theme: false,
            inline_depth: usize::MAX,
        }
    }
}

struct Theme {
    background: &'static str,
    font: &'static str,
    step: &'static str,
    inserted: &'static str,
    io: &'static str,
}

const LIGHT: Theme = Theme {
    background: "white",
    font: "black",
    step: "lightblue",
    inserted: "khaki",
    io: "lightgrey",
};

const DARK: Theme = Theme {
    background: "black",
    font: "white",
    step: "steelblue",
    inserted: "darkgoldenrod",
    io: "dimgrey",
};

/// Renders `graph` in DOT syntax.
pub fn to_dot(graph: &Graph, options: &GraphOptions) -> String {
    let theme = if options.dark_theme { &DARK } else { &LIGHT };
    let mut out = String::new();

    let _ = writeln!(out, "digraph \"{}\" {{", escape(&graph.id));
    let _ = writeln!(
        out,
        "  bgcolor=\"{}\";\n  node [fontcolor=\"{}\", style=filled];\n  edge [color=\"{}\", fontcolor=\"{}\"];",
        theme.background, theme.font, theme.font, theme.font
    );
    render_scope(&mut out, graph, "", 0, options, theme);
    out.push_str("}\n");
    out
}

fn render_scope(
    out: &mut String,
    graph: &Graph,
    prefix: &str,
    depth: usize,
    options: &GraphOptions,
    theme: &Theme,
) {
    let indent = "  ".repeat(depth + 1);

    if options.show_inputs {
        for input in &graph.inputs {
            let _ = writeln!(
                out,
                "{}\"{}\" [label=\"{}\", shape=invhouse, fillcolor=\"{}\"];",
                indent,
                node_name(prefix, &format!("input:{}", input.name)),
                escape(&input.name),
                theme.io
            );
        }
    }

    for node in &graph.nodes {
        match &node.subgraph {
            Some(subgraph) if depth < options.inline_depth => {
                let cluster = node_name(prefix, &node.id);
                let _ = writeln!(out, "{}subgraph \"cluster_{}\" {{", indent, cluster);
                let _ = writeln!(out, "{}  label=\"{}\";", indent, escape(&step_label(node, options)));
                let _ = writeln!(out, "{}  fontcolor=\"{}\";", indent, theme.font);
                render_scope(out, subgraph, &cluster, depth + 1, options, theme);
                let _ = writeln!(out, "{}}}", indent);
            }
            _ => {
                let fill = if node.inserted { theme.inserted } else { theme.step };
                let _ = writeln!(
                    out,
                    "{}\"{}\" [label=\"{}\", shape=box, fillcolor=\"{}\"];",
                    indent,
                    node_name(prefix, &node.id),
                    escape(&step_label(node, options)),
                    fill
                );
            }
        }
    }

    if options.show_outputs {
        for output in &graph.outputs {
            let _ = writeln!(
                out,
                "{}\"{}\" [label=\"{}\", shape=house, fillcolor=\"{}\"];",
                indent,
                node_name(prefix, &format!("output:{}", output.port.name)),
                escape(&output.port.name),
                theme.io
            );
        }
    }

    let scope = Scope {
        graph,
        prefix,
        depth,
    };
    for edge in &graph.edges {
        render_edge(out, &indent, &scope, edge, options);
    }
}

/// The graph being rendered and where it sits in the cluster nesting.
struct Scope<'a> {
    graph: &'a Graph,
    prefix: &'a str,
    depth: usize,
}

impl Scope<'_> {
    /// Name prefix of the cluster drawn for `step`, if it is drawn as one.
    fn cluster(&self, step: &str, options: &GraphOptions) -> Option<String> {
        let node = self.graph.node(step)?;
        (node.subgraph.is_some() && self.depth < options.inline_depth)
            .then(|| node_name(self.prefix, step))
    }

    /// DOT node for an edge endpoint, or `None` when that endpoint is hidden.
    /// Edges into or out of a cluster attach to its interface nodes.
    fn endpoint(&self, endpoint: &Endpoint, incoming: bool, options: &GraphOptions) -> Option<String> {
        match endpoint {
            Endpoint::Input(name) => options
                .show_inputs
                .then(|| node_name(self.prefix, &format!("input:{}", name))),
            Endpoint::Output(name) => options
                .show_outputs
                .then(|| node_name(self.prefix, &format!("output:{}", name))),
            Endpoint::Step { step, port } => match self.cluster(step, options) {
                Some(cluster) if incoming => options
                    .show_inputs
                    .then(|| node_name(&cluster, &format!("input:{}", port))),
                Some(cluster) => options
                    .show_outputs
                    .then(|| node_name(&cluster, &format!("output:{}", port))),
                None => Some(node_name(self.prefix, step)),
            },
        }
    }
}

fn render_edge(out: &mut String, indent: &str, scope: &Scope, edge: &Edge, options: &GraphOptions) {
    let Some(from) = scope.endpoint(&edge.from, false, options) else {
        return;
    };
    let Some(to) = scope.endpoint(&edge.to, true, options) else {
        return;
    };

    let mut attributes = Vec::new();
    if options.label_edges {
        if let Endpoint::Step { port, .. } = &edge.to {
            attributes.push(format!("label=\"{}\"", escape(port)));
        }
    }
    match edge.link {
        Link::Scatter => attributes.push("style=bold".to_string()),
        Link::Gather => attributes.push("style=dashed".to_string()),
        Link::Direct => {}
    }

    if attributes.is_empty() {
        let _ = writeln!(out, "{}\"{}\" -> \"{}\";", indent, from, to);
    } else {
        let _ = writeln!(
            out,
            "{}\"{}\" -> \"{}\" [{}];",
            indent,
            from,
            to,
            attributes.join(", ")
        );
    }
}

fn step_label(node: &Node, options: &GraphOptions) -> String {
    if options.label_stepname {
        format!("{} ({})", node.id, node.tool)
    } else {
        node.id.clone()
    }
}

fn node_name(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        escape(name)
    } else {
        format!("{}/{}", prefix, escape(name))
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
