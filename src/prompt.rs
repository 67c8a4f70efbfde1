use crate::job::Job;
use crate::segmenter::DEFAULT_DELIMITER;

/// Builds the single free-text prompt sent to the generation service.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    delimiter: String,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_DELIMITER)
    }
}

impl PromptBuilder {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }

    pub fn build(&self, job: &Job) -> String {
        let delim = &self.delimiter;
        let mut goal = job.goal.trim().to_string();
        if let Some(hint) = job.chart_type_hint.as_deref().map(str::trim)
            && !hint.is_empty()
        {
            goal.push_str(&format!(", please use a {hint} chart"));
        }

        format!(
            "You are a data analyst and front-end visualization expert. I will give you \
             content in the following fixed format:\n\
             \n\
             Analysis goal:\n\
             (the requirement or goal of the analysis)\n\
             Raw data:\n\
             (raw data in CSV format, using , as the separator)\n\
             \n\
             Based on these two parts, produce output in exactly this format and nothing else \
             (no extra opening, closing or comments):\n\
             {delim}\n\
             {{an ECharts V5 option object as formatted JSON that visualizes the data sensibly, \
             with no comments or other extra content}}\n\
             {delim}\n\
             {{a clear, detailed written analysis conclusion, with no extra comments}}\n\
             Analysis goal: {goal}\n\
             Data:\n{data}\n",
            data = job.raw_data.trim_end(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobInput, NewJob};

    fn job(input: JobInput) -> Job {
        Job::from_new(NewJob::new("u1", input).unwrap())
    }

    #[test]
    fn prompt_names_delimiter_goal_and_data() {
        let prompt = PromptBuilder::default().build(&job(JobInput::new(
            "compare sales",
            "month,sales\nJan,10\nFeb,20\n",
        )));
        assert_eq!(prompt.matches(DEFAULT_DELIMITER).count(), 2);
        assert!(prompt.contains("Analysis goal: compare sales\n"));
        assert!(prompt.ends_with("Data:\nmonth,sales\nJan,10\nFeb,20\n"));
    }

    #[test]
    fn chart_type_hint_is_appended_to_goal() {
        let prompt = PromptBuilder::new("##").build(&job(
            JobInput::new("compare sales", "a,b").with_chart_type("bar"),
        ));
        assert!(prompt.contains("Analysis goal: compare sales, please use a bar chart\n"));
        assert_eq!(prompt.matches("##").count(), 2);
    }

    #[test]
    fn blank_hint_is_ignored() {
        let prompt = PromptBuilder::default()
            .build(&job(JobInput::new("trend", "a,b").with_chart_type("  ")));
        assert!(prompt.contains("Analysis goal: trend\n"));
    }
}
