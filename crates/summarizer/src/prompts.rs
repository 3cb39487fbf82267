//! Prompt templates for the two-stage table reduction and the news corpus
//! summaries.

pub fn column_selector(objective: &str, column_names: &[String]) -> String {
    format!(
        r#"
你是一位专业的金融数据分析师。
给定一个数据表的可用列名列表，你的任务是为特定的分析目标选择一些最重要和最相关的列。

分析目标: "{objective}"
可用列名: {columns:?}

请只返回一个包含你选择的最相关列名的JSON列表。
例如: ["col1", "col2", "col3"]
"#,
        columns = column_names
    )
}

pub fn table_summarizer(objective: &str, table_data: &str) -> String {
    format!(
        r#"
你是一位专业的金融数据分析师。
给定一个关于'{objective}'的数据表，你的任务是生成一段简洁、精炼的自然语言摘要。
摘要应捕捉数据中的核心洞察、关键数值和明显趋势。

数据表:
{table_data}

你的摘要:
"#
    )
}

pub fn tech_table_analyzer(objective: &str, table_data: &str) -> String {
    format!(
        r#"
你是一位专业的金融数据分析师，擅长技术分析。
给定一个关于“{objective}”的数据表，请基于表格生成一份**详细的小结**，要求：

1. 提供数据的概览（时间范围、样本数量等）。
2. 提炼关键的统计指标或趋势（例如均线形态、指标超买超卖、成交量变化）。
3. 给出基于数据的分析结论，不要空泛表述。
4. 使用专业、简洁的中文表述。

数据表：
{table_data}

请输出分析小结：
"#
    )
}

pub fn fund_table_analyzer(objective: &str, table_data: &str) -> String {
    format!(
        r#"
你是一位专业的金融数据分析师，擅长资金流向分析。
给定一个关于“{objective}”的数据表，请基于表格生成一份**详细的小结**，要求：

1. 提供数据的概览（时间范围、样本数量等）。
2. 提炼关键的统计指标或趋势（例如主力资金流入、机构资金增持、散户资金流入）。
3. 给出基于数据的分析结论，不要空泛表述。
4. 使用专业、简洁的中文表述。

数据表：
{table_data}

请输出分析小结：
"#
    )
}

pub fn news_corpus(corpus: &str, time_range: &str, stat_line: &str) -> String {
    format!(
        r#"
请基于以下新闻数据，生成专业的新闻分析摘要：

时间范围：{time_range}
{stat_line}

新闻数据：
{corpus}

要求：
1. 分析新闻的整体情绪倾向（正面/中性/负面）
2. 提取关键信息点和重要事件
3. 评估对相关股票或市场的影响
4. 语言简洁专业，适合投资分析使用
5. 重点关注与投资决策相关的信息

请直接返回分析结果，不要添加格式标记。
"#
    )
}

pub fn news_corpus_structured(corpus: &str, time_range: &str, stat_line: &str) -> String {
    format!(
        r#"
请基于以下新闻数据，输出结构化的舆情总结。

时间范围：{time_range}
{stat_line}

新闻数据：
{corpus}

**输出格式要求**（严格遵守以下JSON结构，不要输出多余文字）：
```json
{{
  "overall_sentiment": "正面 / 中性 / 负面",
  "reasons": ["结论理由1", "结论理由2", "结论理由3"],
  "proportions": {{"positive": "xx%", "neutral": "xx%", "negative": "xx%"}},
  "catalysts": [{{"point": "催化因素", "horizon": "短/中/长"}}],
  "risks": [{{"point": "风险因素", "horizon": "短/中/长"}}],
  "policy_points": ["政策/监管要点"],
  "score": 0,
  "one_liner": "一句话总结，<=40字"
}}
```
"#
    )
}

pub fn single_news(title: &str, snippet: &str, page_text: &str) -> String {
    format!(
        r#"
请针对下面这条新闻，输出简短的结构化分析。

标题：{title}
摘要：{snippet}
正文片段：{body}

**输出格式要求**（严格遵守以下JSON结构）：
```json
{{
  "summary": "80字以内的要点概括",
  "key_points": ["要点1", "要点2"],
  "sentiment": "正面 / 中性 / 负面",
  "confidence": 80
}}
```
"#,
        body = page_text.chars().take(2000).collect::<String>()
    )
}

pub fn company_info(stock_basic: &serde_json::Value, company_detail: &serde_json::Value) -> String {
    format!(
        r#"
请基于以下公司信息，生成一段简洁、专业的公司概况描述（100-200字）：

公司基本信息：
{stock_basic}

公司详细信息：
{company_detail}

要求：
1. 突出公司的核心特征和行业地位
2. 语言简洁专业，适合投资分析使用
3. 重点描述主营业务、行业分类、地理位置等关键信息
4. 如果有注册资本、员工数量等数据，请适当提及

请直接返回描述文本，不要添加任何格式标记。
"#
    )
}

pub fn upper_industry_terms(term: &str) -> String {
    format!("请给出‘{term}’所属的上位行业词，不超过5个，用中文输出，使用逗号分隔，且只输出词本身。")
}
