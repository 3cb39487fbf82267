//! Analyst role descriptions and prompt templates. Every template demands a
//! fenced JSON object in the report envelope shape.

pub const FUNDAMENTAL_ROLE: &str =
    "你是一位资深基本面分析师，评估公司的内在价值，关注盈利能力、财务健康状况和长期增长潜力。";
pub const TECHNICAL_ROLE: &str =
    "你是一位资深技术分析师，通过历史价格、成交量和技术指标研判未来走势。";
pub const SENTIMENT_ROLE: &str =
    "你是一位市场情绪分析师，从新闻舆情与基本面信息中提炼市场情绪与预期变化。";
pub const NEWS_ROLE: &str =
    "你是一位新闻舆情分析师，评估新闻事件对股票的方向性影响与市场关注度。";
pub const FUND_ROLE: &str =
    "你是一位资金流向分析师，追踪主力、机构与散户资金动向，判断资金意图。";
pub const SUPERVISOR_ROLE: &str =
    "你是一位总决策投资分析师，负责整合多方信息并给出全周期投资建议。";

fn analyst_template(
    role_description: &str,
    stock_code: &str,
    analysis_period: &str,
    task: &str,
    data_label: &str,
    data: &str,
    analyst_name: &str,
    score_lines: &str,
) -> String {
    format!(
        r#"
{role_description}

{task}

**股票代码**: {stock_code}
**分析时间段**: {analysis_period}

**{data_label}**：
---
{data}
---

请基于以上数据给出明确观点（看多/看空/中性）、理由、各维度评分（0-5的整数）与详细分析。
不得凭空捏造数据；数据缺失时在分析中说明。

**输出格式要求**（严格遵守以下JSON结构）：
```json
{{
  "analyst_name": "{analyst_name}",
  "viewpoint": "看多 / 看空 / 中性",
  "reason": "核心理由，<=100字",
  "scores": {{
{score_lines}
  }},
  "detailed_analysis": "详细分析，300-500字"
}}
```
"#
    )
}

pub fn fundamental(stock_code: &str, analysis_period: &str, fundamental_data: &str) -> String {
    analyst_template(
        FUNDAMENTAL_ROLE,
        stock_code,
        analysis_period,
        "你的任务是基于以下基本面数据，评估公司的盈利能力、偿债能力与成长潜力。",
        "基本面数据",
        fundamental_data,
        "基本面分析师",
        r#"    "profitability": 0,
    "solvency": 0,
    "growth_potential": 0"#,
    )
}

pub fn technical(stock_code: &str, analysis_period: &str, tech_data: &str) -> String {
    analyst_template(
        TECHNICAL_ROLE,
        stock_code,
        analysis_period,
        "你的任务是基于以下技术面数据（K线、技术指标、估值与涨跌停信息），研判趋势与买卖点。",
        "技术面数据",
        tech_data,
        "技术分析师",
        r#"    "trend_strength": 0,
    "momentum": 0,
    "support_resistance": 0,
    "volume_analysis": 0,
    "pattern_analysis": 0"#,
    )
}

pub fn sentiment(stock_code: &str, analysis_period: &str, sentiment_data: &str) -> String {
    analyst_template(
        SENTIMENT_ROLE,
        stock_code,
        analysis_period,
        "你的任务是基于新闻合并摘要与基本面信息摘要，评估市场热度、投资者情绪与机构态度。",
        "情绪面输入（新闻合并摘要 + 基本面摘要）",
        sentiment_data,
        "情绪分析师",
        r#"    "market_heat": 0,
    "investor_sentiment": 0,
    "institution_opinion": 0"#,
    )
}

pub fn news(stock_code: &str, analysis_period: &str, news_data: &str) -> String {
    analyst_template(
        NEWS_ROLE,
        stock_code,
        analysis_period,
        "你的任务是基于以下新闻数据，评估新闻情绪、事件影响与市场关注度。",
        "新闻数据",
        news_data,
        "新闻分析师",
        r#"    "sentiment_score": 0,
    "news_impact": 0,
    "market_attention": 0"#,
    )
}

pub fn fund(stock_code: &str, analysis_period: &str, fund_data: &str) -> String {
    analyst_template(
        FUND_ROLE,
        stock_code,
        analysis_period,
        "你的任务是基于以下资金流向数据（股东结构、主力动向、龙虎榜、北向资金、筹码分布），判断各类资金意图。",
        "资金面数据",
        fund_data,
        "资金流向分析师",
        r#"    "main_capital": 0,
    "institution_capital": 0,
    "retail_capital": 0"#,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn supervisor(
    stock_code: &str,
    analysis_period: &str,
    fundamental_report: &str,
    technical_report: &str,
    sentiment_report: &str,
    fund_report: &str,
    news_summary: &str,
) -> String {
    format!(
        r#"
{SUPERVISOR_ROLE}

你负责在整合多方信息后，为股票 {stock_code} 给出**短期、中期、长期**全周期的投资预测与建议。

**分析时间段**: {analysis_period}

你将收到以下输入（均为已保存报告/摘要）：
1. **基本面报告**（fundamental_report）
2. **技术面报告**（technical_report）
3. **资金面报告**（fund_report）
4. **情绪面报告**（sentiment_report）
5. **新闻面摘要**（news_summary，来自新闻合并后的 summary，而非新闻分析报告）

请按以下步骤分析：
1. **信息融合**：整合各面结论与评分，提炼一致观点与分歧。
2. **全周期分析**：
   - **短期（1-2周）**：侧重情绪、技术、资金的合力与风险。
   - **中期（1-3个月）**：侧重趋势与基本面变化、资金持续性。
   - **长期（6个月以上）**：侧重基本面、行业与宏观格局。
3. **风险与不确定性**：识别关键催化与风险点。
4. **投资预测与建议**：每个周期给出倾向（看多/看空/中性）、预测区间、建议与风险提示。

**输入数据**：
- 领域分析师报告/摘要：
---
{fundamental_report}
---
{technical_report}
---
{sentiment_report}
---
{fund_report}
---
{news_summary}
---

**输出格式要求**（严格遵守以下JSON结构）：
```json
{{
  "analyst_name": "总决策分析师",
  "summary": "融合所有分析的总体总结，150-250字",
  "forecast": {{
    "short_term": {{
      "bias": "看多 / 看空 / 中性",
      "prediction": "短期价格走势预测与可能区间",
      "suggestion": "短期操作建议，如快进快出、波段交易等",
      "reason": "短期价格走势预测与可能区间的原因",
      "risks": ["风险因素1", "风险因素2"]
    }},
    "mid_term": {{
      "bias": "看多 / 看空 / 中性",
      "prediction": "中期价格走势预测与可能区间",
      "suggestion": "中期操作建议，如持仓等待、分批建仓等",
      "reason": "中期价格走势预测与可能区间的原因",
      "risks": ["风险因素1", "风险因素2"]
    }},
    "long_term": {{
      "bias": "看多 / 看空 / 中性",
      "prediction": "长期价格走势预测与可能区间",
      "suggestion": "长期操作建议，如价值投资、长期持有等",
      "reason": "长期价格走势预测与可能区间的原因",
      "risks": ["风险因素1", "风险因素2"]
    }}
  }}
}}
```
"#
    )
}
