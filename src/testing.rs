//! Chart fixtures for unit tests. Names starting with `T` are transitions,
//! everything else is a step.

use crate::buffer::{LineBuffer, LineRange};
use crate::extract::extract;
use crate::ir::ObjectSet;

#[derive(Debug, Clone)]
struct StepSpec {
    name: String,
    actions: Vec<(String, String, String)>,
}

#[derive(Debug, Clone)]
pub(crate) struct Chart {
    name: String,
    initial: Option<String>,
    steps: Vec<StepSpec>,
    transitions: Vec<(String, String)>,
    links: Vec<(bool, String, String)>,
}

fn is_transition(name: &str) -> bool {
    name.starts_with('T')
}

impl Chart {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            initial: None,
            steps: Vec::new(),
            transitions: Vec::new(),
            links: Vec::new(),
        }
    }

    pub(crate) fn step(mut self, name: &str) -> Self {
        self.ensure(name);
        self
    }

    pub(crate) fn initial(mut self, name: &str) -> Self {
        self.initial = Some(name.to_string());
        self
    }

    pub(crate) fn action(mut self, step: &str, action: &str, qualifier: &str, delay: &str) -> Self {
        self.ensure(step);
        if let Some(spec) = self.steps.iter_mut().find(|s| s.name == step) {
            spec.actions
                .push((action.to_string(), qualifier.to_string(), delay.to_string()));
        }
        self
    }

    pub(crate) fn condition(mut self, transition: &str, expression: &str) -> Self {
        self.ensure(transition);
        if let Some(spec) = self.transitions.iter_mut().find(|t| t.0 == transition) {
            spec.1 = expression.to_string();
        }
        self
    }

    /// Link consecutive elements of an alternating step/transition path.
    pub(crate) fn chain(mut self, path: &[&str]) -> Self {
        for name in path {
            self.ensure(name);
        }
        for pair in path.windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if is_transition(from) {
                self.links.push((false, to.to_string(), from.to_string()));
            } else {
                self.links.push((true, from.to_string(), to.to_string()));
            }
        }
        self
    }

    fn ensure(&mut self, name: &str) {
        if is_transition(name) {
            if !self.transitions.iter().any(|t| t.0 == name) {
                self.transitions.push((name.to_string(), "TRUE".to_string()));
            }
        } else if !self.steps.iter().any(|s| s.name == name) {
            self.steps.push(StepSpec {
                name: name.to_string(),
                actions: Vec::new(),
            });
        }
    }

    pub(crate) fn text(&self) -> String {
        let initial = self
            .initial
            .clone()
            .or_else(|| self.steps.first().map(|s| s.name.clone()))
            .unwrap_or_default();
        let mut out = vec![
            format!(r#"FUNCTION_BLOCK_DEFINITION NAME="{}" CATEGORY="Library/SFC""#, self.name),
            r#" user="ADMIN" time=1700000000/* "14-Nov-2023 22:13:20" */"#.to_string(),
            "{".to_string(),
            r#"  DESCRIPTION="""#.to_string(),
            "  SFC_ALGORITHM".to_string(),
            "  {".to_string(),
            "    GRAPHICS ALGORITHM=SFC".to_string(),
            "    {".to_string(),
            "    }".to_string(),
        ];
        for step in &self.steps {
            out.push(format!(r#"    STEP NAME="{}" DEFINITION="""#, step.name));
            out.push("    {".to_string());
            out.push(r#"      DESCRIPTION="""#.to_string());
            out.push("      RECTANGLE= { X=0 Y=0 H=30 W=80 }".to_string());
            let flag = if step.name == initial { "T" } else { "F" };
            out.push(format!("      INITIAL_STEP={flag}"));
            for (action, qualifier, delay) in &step.actions {
                out.push(format!(r#"      ACTION NAME="{action}""#));
                out.push("      {".to_string());
                out.push(r#"        DESCRIPTION="""#.to_string());
                out.push("        ACTION_TYPE=ASSIGN".to_string());
                out.push(format!("        QUALIFIER={qualifier}"));
                out.push(r#"        EXPRESSION="'^/X.CV' := 1;""#.to_string());
                out.push(format!(r#"        DELAY_EXPRESSION="{delay}""#));
                out.push("      }".to_string());
            }
            out.push("    }".to_string());
        }
        for (name, expression) in &self.transitions {
            out.push(format!(r#"    TRANSITION NAME="{name}""#));
            out.push("    {".to_string());
            out.push("      POSITION= { X=0 Y=0 }".to_string());
            out.push("      TERMINATION=F".to_string());
            out.push(format!(r#"      EXPRESSION="{expression}""#));
            out.push("    }".to_string());
        }
        for (step_first, step, transition) in &self.links {
            let segment = "{ SEGMENT= { X1=0 Y1=0 X2=0 Y2=0 } }";
            if *step_first {
                out.push(format!(
                    r#"    STEP_TRANSITION_CONNECTION STEP="{step}" TRANSITION="{transition}" {segment}"#
                ));
            } else {
                out.push(format!(
                    r#"    TRANSITION_STEP_CONNECTION TRANSITION="{transition}" STEP="{step}" {segment}"#
                ));
            }
        }
        out.push("  }".to_string());
        out.push("}".to_string());
        out.join("\n")
    }

    pub(crate) fn buffer(&self) -> LineBuffer {
        LineBuffer::new(self.text().split('\n').map(str::to_string).collect())
    }

    pub(crate) fn objects(&self) -> ObjectSet {
        let buffer = self.buffer();
        extract(&buffer, &self.name, LineRange::new(0, buffer.len()))
            .expect("fixture chart extracts")
    }
}
